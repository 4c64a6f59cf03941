use anyhow::{Result, anyhow};
use std::path::PathBuf;
use url::Url;

/// Parsed storage base URI
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageUri {
    Local(PathBuf),
    /// `prefix` has no leading or trailing '/' and may be empty
    S3 { bucket: String, prefix: String },
}

impl StorageUri {
    /// Parse a URI string into a StorageUri
    pub fn parse(uri: &str) -> Result<Self> {
        let uri = uri.trim();
        if uri.is_empty() {
            return Err(anyhow!("Storage URI must not be empty"));
        }

        // Try parsing as URL first
        if let Ok(url) = Url::parse(uri) {
            match url.scheme() {
                "s3" | "s3a" => {
                    let bucket = url
                        .host_str()
                        .filter(|b| !b.is_empty())
                        .ok_or_else(|| anyhow!("S3 URI missing bucket: {}", uri))?
                        .to_string();

                    let prefix = url.path().trim_matches('/').to_string();

                    Ok(StorageUri::S3 { bucket, prefix })
                }
                "file" => {
                    let path = url
                        .to_file_path()
                        .map_err(|_| anyhow!("Invalid file:// URI: {}", uri))?;
                    Ok(StorageUri::Local(path))
                }
                scheme if scheme.len() == 1 => {
                    // Windows drive letter, e.g. C:\data
                    Ok(StorageUri::Local(PathBuf::from(uri)))
                }
                scheme => Err(anyhow!("Unsupported URI scheme: {}", scheme)),
            }
        } else {
            // Treat as local directory
            Ok(StorageUri::Local(PathBuf::from(uri)))
        }
    }

    /// Render the location of `key` under this base, for logs and reports
    pub fn display_key(&self, key: &str) -> String {
        match self {
            StorageUri::Local(root) => root.join(key).display().to_string(),
            StorageUri::S3 { bucket, prefix } if prefix.is_empty() => {
                format!("s3://{}/{}", bucket, key)
            }
            StorageUri::S3 { bucket, prefix } => format!("s3://{}/{}/{}", bucket, prefix, key),
        }
    }
}
