use std::path::Path;

use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Serialize `value` as pretty JSON to `path.tmp`, then rename onto `path`.
///
/// Readers must never observe the `.tmp` file: the rename is the single
/// atomic step that makes the new contents visible. A crash mid-write
/// leaves the previous `path` untouched.
pub async fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> std::io::Result<()> {
    let tmp_path = tmp_path_for(path);
    let bytes = serde_json::to_vec_pretty(value)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

    let mut file = fs::File::create(&tmp_path).await?;
    file.write_all(&bytes).await?;
    file.sync_all().await?;
    drop(file);

    fs::rename(&tmp_path, path).await?;
    Ok(())
}

fn tmp_path_for(path: &Path) -> std::path::PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(".tmp");
    std::path::PathBuf::from(os)
}
