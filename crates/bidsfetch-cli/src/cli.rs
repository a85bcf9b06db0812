use std::path::PathBuf;

use bidsfetch_core::FetchRequest;
use bidsfetch_domain::{RunId, SubjectId};
use clap::{ArgAction, Parser};

pub const BIDSFETCH_HELP_TEMPLATE: &str =
    "{before-help}\nUsage:\n    {usage}\n\nOptions:\n{options}\n";

pub const BIDSFETCH_BEFORE_HELP: &str = concat!(
    "bidsfetch ",
    env!("CARGO_PKG_VERSION"),
    " – partial mirror of OpenNeuro ds000102 (flanker task)\n\n",
    "\x1b[1;36mSelected per subject and run\x1b[0m\n",
    "  raw              dataset metadata, sub-NN/anat/*, sub-NN/func/*run-RR*\n",
    "  derivatives      fMRIPrep T1w, boldref, brain mask, preprocessed BOLD, confounds\n\n",
    "\x1b[1;36mLocal layout\x1b[0m\n",
    "  <dest>/                        raw BIDS tree\n",
    "  <dest>/derivatives/fmriprep/   fMRIPrep subset\n\n",
    "Re-running is safe: files already present with the same size are skipped.\n",
);

#[derive(Parser, Debug)]
#[command(
    name = "bidsfetch",
    author,
    version,
    about = "Download selected subjects and runs of ds000102 with their fMRIPrep outputs",
    before_help = BIDSFETCH_BEFORE_HELP,
    help_template = BIDSFETCH_HELP_TEMPLATE
)]
#[allow(clippy::struct_excessive_bools)]
pub struct BidsfetchCli {
    #[arg(
        long,
        value_name = "IDS",
        value_delimiter = ',',
        help = "Comma-separated subject numbers [default: 1]"
    )]
    pub subjects: Vec<SubjectId>,
    #[arg(
        long,
        value_name = "IDS",
        value_delimiter = ',',
        help = "Comma-separated run numbers [default: 1]"
    )]
    pub runs: Vec<RunId>,
    #[arg(
        long,
        value_name = "DIR",
        help = "Local dataset root [default: data/ds000102, or BIDSFETCH_DEST]"
    )]
    pub dest: Option<PathBuf>,
    #[arg(long, help = "List what would be copied without writing anything")]
    pub dry_run: bool,
    #[arg(short, long, help = "Suppress human output (errors still print to stderr)")]
    pub quiet: bool,
    #[arg(short, long, action = ArgAction::Count, help = "Increase logging (-vv reaches debug)")]
    pub verbose: u8,
    #[arg(long, help = "Force trace logging regardless of -v/-q")]
    pub trace: bool,
    #[arg(long, help = "Emit {status,message,details} JSON envelopes")]
    pub json: bool,
    #[arg(long, help = "Disable colored human output")]
    pub no_color: bool,
}

impl BidsfetchCli {
    pub fn request(&self) -> FetchRequest {
        FetchRequest {
            subjects: self.subjects.clone(),
            runs: self.runs.clone(),
            dest: self.dest.clone(),
            dry_run: self.dry_run,
            progress: !(self.quiet || self.json),
        }
    }
}
