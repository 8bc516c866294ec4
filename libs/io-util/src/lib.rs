// Copyright 2025 Anapaya Systems
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//! I/O utility functions.

use std::{
    ffi::OsString,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use serde::{Serialize, de::DeserializeOwned};
use tokio::{
    fs::{self, File, OpenOptions},
    io::{AsyncReadExt, AsyncWriteExt},
};

/// Reads a file and deserializes its content into the specified type.
pub async fn read_file<P, T>(path: P) -> std::io::Result<T>
where
    P: AsRef<Path>,
    T: DeserializeOwned,
{
    let mut buf = Vec::new();
    File::open(path.as_ref())
        .await?
        .read_to_end(&mut buf)
        .await?;
    serde_json::from_slice(&buf).map_err(std::io::Error::other)
}

/// Like [read_file], but returns `None` if the file does not exist.
pub async fn read_file_if_exists<P, T>(path: P) -> std::io::Result<Option<T>>
where
    P: AsRef<Path>,
    T: DeserializeOwned,
{
    match read_file(path).await {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Serializes the given type to JSON and replaces the file at the specified path.
///
/// The content is written to a sibling temporary file first and then renamed over the
/// destination, so readers never observe a partially written file.
pub async fn write_file(path: impl AsRef<Path>, content: &impl Serialize) -> std::io::Result<()> {
    let path = path.as_ref();
    let buf = serde_json::to_vec_pretty(content).map_err(std::io::Error::other)?;

    let tmp_path = sibling_tmp_path(path);
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&tmp_path)
        .await?;
    file.write_all(&buf).await?;
    file.sync_all().await?;
    drop(file);

    if let Err(e) = fs::rename(&tmp_path, path).await {
        let _ = fs::remove_file(&tmp_path).await;
        return Err(e);
    }
    Ok(())
}

/// Returns a temporary path in the system's temp directory, prefixed with the current thread name.
pub fn get_tmp_path<S: AsRef<str>>(name: S) -> PathBuf {
    let path = std::env::temp_dir();
    let current_thread = std::thread::current()
        .name()
        .unwrap_or("unnamed")
        .replace("::", "_");
    path.join(format!("{}_{}", current_thread, name.as_ref()))
}

fn sibling_tmp_path(path: &Path) -> PathBuf {
    let mut file_name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("state"));
    file_name.push(".tmp");
    path.with_file_name(file_name)
}
