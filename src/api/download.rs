//! 下载生成的 Excel 文件
//!
//! 只提供下载目录内的 `.xlsx` 文件；文件名带路径分隔符、`..`，
//! 或解析后落在目录外的一律拒绝。

use std::path::{Path, PathBuf};

use axum::extract::{Path as UrlPath, State};
use axum::http::header;
use axum::response::IntoResponse;

use super::AppState;
use crate::error::{AppError, AppResult, FileError};

const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

pub async fn download(
    State(state): State<AppState>,
    UrlPath(filename): UrlPath<String>,
) -> AppResult<impl IntoResponse> {
    let path = resolve(&state.download_dir, &filename)?;
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| AppError::file_read_failed(path.display().to_string(), e))?;

    let disposition = format!(
        "attachment; filename*=UTF-8''{}",
        urlencoding::encode(&filename)
    );
    Ok((
        [
            (header::CONTENT_TYPE, XLSX_MIME.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    ))
}

/// 校验文件名并解析为下载目录内的路径
pub fn resolve(dir: &Path, filename: &str) -> AppResult<PathBuf> {
    let invalid = || {
        AppError::File(FileError::InvalidName {
            name: filename.to_string(),
        })
    };

    if filename.is_empty()
        || filename.contains(['/', '\\'])
        || filename.contains("..")
        || !filename.to_ascii_lowercase().ends_with(".xlsx")
    {
        return Err(invalid());
    }

    let candidate = dir.join(filename);
    if !candidate.is_file() {
        return Err(AppError::File(FileError::NotFound {
            path: filename.to_string(),
        }));
    }

    let root = dir
        .canonicalize()
        .map_err(|e| AppError::file_read_failed(dir.display().to_string(), e))?;
    let resolved = candidate
        .canonicalize()
        .map_err(|e| AppError::file_read_failed(candidate.display().to_string(), e))?;
    if !resolved.starts_with(&root) {
        return Err(invalid());
    }
    Ok(resolved)
}
