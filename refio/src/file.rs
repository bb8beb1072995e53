use tokio::fs;

use crate::{ReadError, ReadRequest, Reader};

/// Reads `file://` URLs from the local filesystem.
pub struct FileReader;

impl FileReader {
    pub fn new() -> Self {
        Self
    }
}

impl Default for FileReader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Reader for FileReader {
    fn name(&self) -> &str {
        "file"
    }

    fn order(&self) -> i32 {
        100
    }

    fn can_read(&self, request: &ReadRequest) -> bool {
        request.url.scheme() == "file"
    }

    async fn read(&self, request: &ReadRequest) -> Result<Vec<u8>, ReadError> {
        let path = request
            .url
            .to_file_path()
            .map_err(|_| ReadError::Io {
                path: request.url.to_string(),
                message: "not a local file path".to_string(),
            })?;
        fs::read(&path).await.map_err(|err| ReadError::Io {
            path: path.to_string_lossy().to_string(),
            message: err.to_string(),
        })
    }
}
