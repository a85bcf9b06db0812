use std::env;

use bidsfetch_core::CommandStatus;
use color_eyre::owo_colors::OwoColorize;

pub struct Style {
    enabled: bool,
}

impl Style {
    pub fn new(force_no_color: bool, is_tty: bool) -> Self {
        let env_no_color = env::var_os("NO_COLOR").is_some();
        Self {
            enabled: !(force_no_color || env_no_color) && is_tty,
        }
    }

    pub fn status(&self, status: &CommandStatus, text: &str) -> String {
        let (symbol, tone) = match status {
            CommandStatus::Ok => ("✔", Tone::Green),
            CommandStatus::UserError => ("✗", Tone::Yellow),
            CommandStatus::Failure => ("✖", Tone::Red),
        };
        let line = format!("{symbol} {text}");
        self.paint(&line, tone, true)
    }

    pub fn info(&self, text: &str) -> String {
        self.paint(text, Tone::Blue, false)
    }

    pub fn warning(&self, text: &str) -> String {
        self.paint(text, Tone::Yellow, false)
    }

    pub fn error(&self, text: &str) -> String {
        self.paint(text, Tone::Red, false)
    }

    /// Job label column, padded before painting so escapes don't skew widths.
    pub fn label(&self, text: &str, width: usize) -> String {
        let padded = format!("{text:<width$}");
        if !self.enabled {
            return padded;
        }
        padded.bold().to_string()
    }

    pub fn dim(&self, text: &str) -> String {
        if !self.enabled {
            return text.to_string();
        }
        text.dimmed().to_string()
    }

    fn paint(&self, text: &str, tone: Tone, bold: bool) -> String {
        if !self.enabled {
            return text.to_string();
        }
        match (tone, bold) {
            (Tone::Green, true) => text.green().bold().to_string(),
            (Tone::Green, false) => text.green().to_string(),
            (Tone::Yellow, true) => text.yellow().bold().to_string(),
            (Tone::Yellow, false) => text.yellow().to_string(),
            (Tone::Red, true) => text.red().bold().to_string(),
            (Tone::Red, false) => text.red().to_string(),
            (Tone::Blue, true) => text.cyan().bold().to_string(),
            (Tone::Blue, false) => text.cyan().to_string(),
        }
    }
}

enum Tone {
    Green,
    Yellow,
    Red,
    Blue,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_when_not_a_terminal() {
        let style = Style::new(false, false);
        assert_eq!(style.status(&CommandStatus::Ok, "done"), "✔ done");
        assert_eq!(style.label("raw", 6), "raw   ");
        assert_eq!(style.error("boom"), "boom");
    }

    #[test]
    fn no_color_flag_wins_over_tty() {
        let style = Style::new(true, true);
        assert_eq!(style.info("hint"), "hint");
    }
}
