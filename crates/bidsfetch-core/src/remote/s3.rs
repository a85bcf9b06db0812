use std::collections::HashSet;
use std::io::Read;
use std::time::{Duration, SystemTime};

use anyhow::{anyhow, Context, Result};
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::Deserialize;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use url::Url;

use super::{ObjectStore, RemoteObject, RemoteRoot};
use crate::error::SyncError;

const USER_AGENT: &str = concat!("bidsfetch/", env!("CARGO_PKG_VERSION"));
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
// Whole-request budget; preprocessed BOLD series run to hundreds of MB.
const HTTP_TIMEOUT: Duration = Duration::from_secs(900);

/// Anonymous, path-style S3 access (`<endpoint>/<bucket>/<key>`).
///
/// Path-style addressing keeps TLS valid for dotted bucket names such as
/// `openneuro.org`. Requests are never signed.
pub struct S3Store {
    root: RemoteRoot,
    endpoint: Url,
    bucket: String,
    prefix: String,
    client: Client,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListBucketResult {
    #[serde(default)]
    contents: Vec<ListEntry>,
    #[serde(default)]
    is_truncated: bool,
    next_continuation_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListEntry {
    key: String,
    size: u64,
    last_modified: Option<String>,
}

impl S3Store {
    /// Creates a store for `s3://<bucket>/<prefix>` served from `endpoint`.
    ///
    /// # Errors
    /// Fails when the endpoint cannot carry a path or the HTTP client cannot
    /// be built.
    pub fn new(endpoint: Url, bucket: &str, prefix: &str) -> Result<Self, SyncError> {
        let root = RemoteRoot::S3 {
            bucket: bucket.to_string(),
            prefix: prefix.trim_matches('/').to_string(),
        };
        if endpoint.cannot_be_a_base() {
            return Err(SyncError::unreachable(
                &root,
                format!("endpoint {endpoint} cannot address buckets"),
            ));
        }
        let client = http_client().map_err(|err| SyncError::unreachable(&root, format!("{err:#}")))?;
        Ok(Self {
            endpoint,
            bucket: bucket.to_string(),
            prefix: prefix.trim_matches('/').to_string(),
            client,
            root,
        })
    }

    fn key_prefix(&self) -> String {
        if self.prefix.is_empty() {
            String::new()
        } else {
            format!("{}/", self.prefix)
        }
    }

    fn bucket_url(&self) -> Result<Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|()| anyhow!("endpoint {} cannot address buckets", self.endpoint))?
            .pop_if_empty()
            .push(&self.bucket);
        Ok(url)
    }

    fn list_url(&self, token: Option<&str>) -> Result<Url> {
        let mut url = self.bucket_url()?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("list-type", "2")
                .append_pair("prefix", &self.key_prefix());
            if let Some(token) = token {
                query.append_pair("continuation-token", token);
            }
        }
        Ok(url)
    }

    fn object_url(&self, key: &str) -> Result<Url> {
        let mut url = self.bucket_url()?;
        url.path_segments_mut()
            .map_err(|()| anyhow!("endpoint {} cannot address objects", self.endpoint))?
            .extend(self.prefix.split('/').filter(|segment| !segment.is_empty()))
            .extend(key.split('/'));
        Ok(url)
    }

    fn list_page(&self, token: Option<&str>) -> Result<ListBucketResult, SyncError> {
        let url = self
            .list_url(token)
            .map_err(|err| SyncError::unreachable(&self.root, format!("{err:#}")))?;
        tracing::debug!(%url, "listing objects");
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| SyncError::unreachable(&self.root, err.to_string()))?;
        match response.status() {
            StatusCode::NOT_FOUND => {
                return Err(SyncError::RootNotFound {
                    root: self.root.to_string(),
                })
            }
            StatusCode::FORBIDDEN => {
                return Err(SyncError::unreachable(
                    &self.root,
                    "access denied (anonymous listing refused)",
                ))
            }
            status if !status.is_success() => {
                return Err(SyncError::unreachable(
                    &self.root,
                    format!("listing returned HTTP {status}"),
                ))
            }
            _ => {}
        }
        let body = response
            .text()
            .map_err(|err| SyncError::unreachable(&self.root, err.to_string()))?;
        quick_xml::de::from_str(&body).map_err(|err| {
            SyncError::unreachable(&self.root, format!("malformed bucket listing: {err}"))
        })
    }
}

impl ObjectStore for S3Store {
    fn root(&self) -> &RemoteRoot {
        &self.root
    }

    fn list(&self) -> Result<Vec<RemoteObject>, SyncError> {
        let prefix = self.key_prefix();
        let mut objects = Vec::new();
        let mut token: Option<String> = None;
        let mut seen_tokens = HashSet::new();
        loop {
            let page = self.list_page(token.as_deref())?;
            for entry in page.contents {
                let Some(relative) = entry.key.strip_prefix(prefix.as_str()) else {
                    continue;
                };
                if relative.is_empty() || relative.ends_with('/') {
                    continue;
                }
                objects.push(RemoteObject {
                    key: relative.to_string(),
                    size: entry.size,
                    last_modified: entry.last_modified.as_deref().and_then(parse_timestamp),
                });
            }
            match (page.is_truncated, page.next_continuation_token) {
                (false, _) => break,
                (true, None) => {
                    return Err(SyncError::unreachable(
                        &self.root,
                        "truncated listing without continuation token",
                    ))
                }
                (true, Some(next)) => {
                    if !seen_tokens.insert(next.clone()) {
                        return Err(SyncError::unreachable(
                            &self.root,
                            format!("listing repeated continuation token {next}"),
                        ));
                    }
                    token = Some(next);
                }
            }
        }
        tracing::debug!(root = %self.root, objects = objects.len(), "listing complete");
        Ok(objects)
    }

    fn open(&self, key: &str) -> Result<Box<dyn Read + Send>> {
        let url = self.object_url(key)?;
        let response = self
            .client
            .get(url.clone())
            .send()
            .with_context(|| format!("failed to fetch {url}"))?
            .error_for_status()
            .with_context(|| format!("unexpected response for {url}"))?;
        Ok(Box::new(response))
    }
}

fn parse_timestamp(raw: &str) -> Option<SystemTime> {
    OffsetDateTime::parse(raw.trim(), &Rfc3339)
        .ok()
        .map(SystemTime::from)
}

fn http_client() -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(HTTP_TIMEOUT)
        .build()
        .context("failed to build http client")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(endpoint: &str, bucket: &str, prefix: &str) -> S3Store {
        S3Store::new(Url::parse(endpoint).unwrap(), bucket, prefix).unwrap()
    }

    #[test]
    fn object_urls_are_path_style_and_encoded() {
        let store = store("https://s3.amazonaws.com", "openneuro.org", "ds000102");
        let url = store.object_url("sub-01/anat/sub 01_T1w.nii.gz").unwrap();
        assert_eq!(
            url.as_str(),
            "https://s3.amazonaws.com/openneuro.org/ds000102/sub-01/anat/sub%2001_T1w.nii.gz"
        );
    }

    #[test]
    fn nested_prefixes_expand_into_segments() {
        let store = store(
            "http://127.0.0.1:9000/",
            "openneuro-derivatives",
            "fmriprep/ds000102-fmriprep",
        );
        let url = store.object_url("dataset_description.json").unwrap();
        assert_eq!(
            url.as_str(),
            "http://127.0.0.1:9000/openneuro-derivatives/fmriprep/ds000102-fmriprep/dataset_description.json"
        );
    }

    #[test]
    fn list_url_carries_prefix_and_token() {
        let store = store("https://s3.amazonaws.com", "openneuro.org", "ds000102");
        let url = store.list_url(Some("abc")).unwrap();
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(url.path(), "/openneuro.org");
        assert!(pairs.contains(&("list-type".into(), "2".into())));
        assert!(pairs.contains(&("prefix".into(), "ds000102/".into())));
        assert!(pairs.contains(&("continuation-token".into(), "abc".into())));
    }

    #[test]
    fn parses_listing_documents() {
        let body = r#"<?xml version="1.0" encoding="UTF-8"?>
<ListBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
  <Name>openneuro.org</Name>
  <Prefix>ds000102/</Prefix>
  <KeyCount>2</KeyCount>
  <MaxKeys>1000</MaxKeys>
  <IsTruncated>true</IsTruncated>
  <Contents>
    <Key>ds000102/README</Key>
    <LastModified>2021-03-04T05:06:07.000Z</LastModified>
    <ETag>"abc"</ETag>
    <Size>120</Size>
    <StorageClass>STANDARD</StorageClass>
  </Contents>
  <Contents>
    <Key>ds000102/sub-01/anat/sub-01_T1w.nii.gz</Key>
    <LastModified>2021-03-04T05:06:07.000Z</LastModified>
    <ETag>"def"</ETag>
    <Size>4096</Size>
    <StorageClass>STANDARD</StorageClass>
  </Contents>
  <NextContinuationToken>next-page</NextContinuationToken>
</ListBucketResult>"#;
        let page: ListBucketResult = quick_xml::de::from_str(body).unwrap();
        assert!(page.is_truncated);
        assert_eq!(page.next_continuation_token.as_deref(), Some("next-page"));
        assert_eq!(page.contents.len(), 2);
        assert_eq!(page.contents[1].size, 4096);
        assert!(page.contents[0]
            .last_modified
            .as_deref()
            .and_then(parse_timestamp)
            .is_some());
    }

    #[test]
    fn rejects_endpoints_without_paths() {
        let endpoint = Url::parse("mailto:someone@example.com").unwrap();
        assert!(S3Store::new(endpoint, "bucket", "").is_err());
    }
}
