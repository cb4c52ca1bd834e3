//! Finished incident clips, with single-range request support.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::Response,
};
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// GET `/accident/hls/<uuid>/index.mp4`.
///
/// A `Range: bytes=start-end` header yields a 206 with that span (the end
/// defaults to the last byte when omitted); otherwise the whole clip is
/// returned with a 200.
pub async fn accident_clip(
    State(state): State<AppState>,
    Path(uuid): Path<String>,
    headers: HeaderMap,
) -> AppResult<Response> {
    let clip = state
        .assembler
        .clip_path(&uuid)
        .ok_or_else(|| AppError::bad_request(format!("invalid clip id {uuid}")))?;

    let meta = tokio::fs::metadata(&clip)
        .await
        .map_err(|_| AppError::not_found(format!("no clip for {uuid}")))?;
    let size = meta.len();

    let range = headers
        .get(header::RANGE)
        .and_then(|value| value.to_str().ok());

    let Some(range) = range else {
        let data = tokio::fs::read(&clip)
            .await
            .map_err(|e| AppError::internal(e.to_string()))?;
        return Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "video/mp4")
            .header(header::CONTENT_LENGTH, size)
            .body(Body::from(data))
            .map_err(|e| AppError::internal(e.to_string()));
    };

    let (start, end) = parse_byte_range(range, size)
        .ok_or_else(|| AppError::bad_request(format!("invalid range {range}")))?;

    let mut file = tokio::fs::File::open(&clip)
        .await
        .map_err(|e| AppError::internal(e.to_string()))?;
    file.seek(std::io::SeekFrom::Start(start))
        .await
        .map_err(|e| AppError::internal(e.to_string()))?;

    let length = end + 1 - start;
    let mut data = vec![0u8; length as usize];
    file.read_exact(&mut data)
        .await
        .map_err(|e| AppError::internal(e.to_string()))?;

    Response::builder()
        .status(StatusCode::PARTIAL_CONTENT)
        .header(header::CONTENT_TYPE, "video/mp4")
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::CONTENT_LENGTH, length)
        .header(
            header::CONTENT_RANGE,
            format!("bytes {start}-{end}/{size}"),
        )
        .body(Body::from(data))
        .map_err(|e| AppError::internal(e.to_string()))
}

/// Parse a single-span `bytes=start-end` header. The end defaults to the
/// last byte when omitted and is clamped to the file size.
fn parse_byte_range(value: &str, size: u64) -> Option<(u64, u64)> {
    if size == 0 {
        return None;
    }
    let spec = value.strip_prefix("bytes=")?;
    let (start, end) = spec.split_once('-')?;

    let start: u64 = start.trim().parse().ok()?;
    let end: u64 = if end.trim().is_empty() {
        size - 1
    } else {
        end.trim().parse().ok()?
    };
    let end = end.min(size - 1);

    if start > end {
        return None;
    }
    Some((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_span() {
        assert_eq!(parse_byte_range("bytes=0-1023", 4096), Some((0, 1023)));
        assert_eq!(parse_byte_range("bytes=100-200", 4096), Some((100, 200)));
    }

    #[test]
    fn open_ended_span_runs_to_last_byte() {
        assert_eq!(parse_byte_range("bytes=1024-", 4096), Some((1024, 4095)));
        assert_eq!(parse_byte_range("bytes=0-", 10), Some((0, 9)));
    }

    #[test]
    fn end_is_clamped_to_size() {
        assert_eq!(parse_byte_range("bytes=0-999999", 100), Some((0, 99)));
    }

    #[test]
    fn malformed_ranges_are_rejected() {
        assert_eq!(parse_byte_range("bytes=", 100), None);
        assert_eq!(parse_byte_range("0-10", 100), None);
        assert_eq!(parse_byte_range("bytes=abc-10", 100), None);
        assert_eq!(parse_byte_range("bytes=50-10", 100), None);
        assert_eq!(parse_byte_range("bytes=0-10", 0), None);
    }
}
