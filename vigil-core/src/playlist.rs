//! Live and VoD m3u8 builders.
//!
//! Both are pure: an ordered segment list in, the playlist body out. The live
//! form interleaves a `#BOUNDING-BOX:` metadata line per segment so players
//! can overlay detections; the VoD form is the terminated playlist an
//! incident group renders before packaging its clip.

use crate::models::TsSegment;

pub const PLAYLIST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";

/// A rendered playlist: media type, joined body, and total media duration.
#[derive(Debug, Clone)]
pub struct Playlist {
    pub content_type: &'static str,
    pub body: String,
    pub duration: f64,
}

/// Build the rolling live playlist.
///
/// `metadata` carries one JSON string per segment (the serialized detection
/// list); a missing entry renders as an empty list. A discontinuity marker is
/// emitted between non-consecutive sequence numbers, except between the final
/// pair: the upstream server is allowed one trailing hole while the last
/// segment is still settling.
#[must_use]
pub fn build_live_playlist(segments: &[TsSegment], url_prefix: &str, metadata: &[String]) -> Playlist {
    let first_seq = segments.first().map_or(0, |s| s.seq_no);
    let max_duration = segments.iter().fold(0.0_f64, |acc, s| acc.max(s.duration));

    let mut lines = vec![
        "#EXTM3U".to_string(),
        "#EXT-X-VERSION:3".to_string(),
        format!("#EXT-X-MEDIA-SEQUENCE:{first_seq}"),
        format!("#EXT-X-TARGETDURATION:{}", max_duration.ceil() as u64),
    ];

    let mut duration = 0.0_f64;
    for (i, segment) in segments.iter().enumerate() {
        if i > 0 {
            let gap = segment.seq_no != segments[i - 1].seq_no + 1;
            let last_pair = i == segments.len() - 1;
            if gap && !last_pair {
                lines.push("#EXT-X-DISCONTINUITY".to_string());
            }
        }

        let boxes = metadata.get(i).map_or("[]", String::as_str);
        lines.push(format!("#BOUNDING-BOX:{boxes}"));
        lines.push(format!("#EXTINF:{:.2}, no desc", segment.duration));
        lines.push(format!("{url_prefix}{}.ts", segment.ts_id));

        duration += segment.duration;
    }

    Playlist {
        content_type: PLAYLIST_CONTENT_TYPE,
        body: lines.join("\n") + "\n",
        duration,
    }
}

/// Build the terminated VoD playlist for a finished recording.
///
/// Segment URIs are the adopted file names, relative to the playlist.
#[must_use]
pub fn build_vod_playlist(segments: &[TsSegment]) -> Playlist {
    let total: f64 = segments.iter().map(|s| s.duration).sum();

    let mut lines = vec![
        "#EXTM3U".to_string(),
        "#EXT-X-VERSION:3".to_string(),
        "#EXT-X-PLAYLIST-TYPE:VOD".to_string(),
        "#EXT-X-ALLOW-CACHE:YES".to_string(),
        "#EXT-X-MEDIA-SEQUENCE:0".to_string(),
        format!("#EXT-X-TARGETDURATION:{}", total.ceil() as u64),
    ];

    for segment in segments {
        let uri = segment
            .stored_key
            .as_deref()
            .and_then(|key| key.file_name())
            .and_then(|name| name.to_str().map(str::to_string))
            .unwrap_or_else(|| segment.file_name());
        lines.push(format!("#EXTINF:{:.2}, no desc", segment.duration));
        lines.push(uri);
    }

    lines.push("#EXT-X-ENDLIST".to_string());

    Playlist {
        content_type: PLAYLIST_CONTENT_TYPE,
        body: lines.join("\n") + "\n",
        duration: total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn segment(seq_no: u64, duration: f64) -> TsSegment {
        TsSegment {
            ts_id: format!("{seq_no}-org-test"),
            source_path: PathBuf::from(format!("process/{seq_no}-org-test.ts")),
            seq_no,
            duration,
            size_bytes: 1,
            origin_url: String::new(),
            stored_key: None,
        }
    }

    #[test]
    fn live_header_and_target_duration() {
        let segments = vec![segment(10, 4.2), segment(11, 5.6)];
        let playlist = build_live_playlist(&segments, "/detect/hls/live/main/", &[]);

        assert_eq!(playlist.content_type, "application/vnd.apple.mpegurl");
        assert!(playlist.body.starts_with("#EXTM3U\n#EXT-X-VERSION:3\n"));
        assert!(playlist.body.contains("#EXT-X-MEDIA-SEQUENCE:10"));
        // ceil(max(4.2, 5.6)) == 6
        assert!(playlist.body.contains("#EXT-X-TARGETDURATION:6"));
        assert!(playlist.body.contains("/detect/hls/live/main/10-org-test.ts"));
        assert!(!playlist.body.contains("#EXT-X-ENDLIST"));
        assert!((playlist.duration - 9.8).abs() < 1e-9);
    }

    #[test]
    fn live_gap_at_final_pair_is_tolerated() {
        // seq 10, 11, 13: the 11->13 hole is the final pair, so no marker.
        let segments = vec![segment(10, 4.0), segment(11, 4.0), segment(13, 4.0)];
        let playlist = build_live_playlist(&segments, "/p/", &[]);
        assert_eq!(playlist.body.matches("#EXT-X-DISCONTINUITY").count(), 0);
    }

    #[test]
    fn live_gap_before_final_pair_is_marked() {
        // Appending seq 14 makes 11->13 an interior hole: exactly one marker.
        let segments = vec![
            segment(10, 4.0),
            segment(11, 4.0),
            segment(13, 4.0),
            segment(14, 4.0),
        ];
        let playlist = build_live_playlist(&segments, "/p/", &[]);
        assert_eq!(playlist.body.matches("#EXT-X-DISCONTINUITY").count(), 1);

        let lines: Vec<&str> = playlist.body.lines().collect();
        let marker = lines
            .iter()
            .position(|l| *l == "#EXT-X-DISCONTINUITY")
            .expect("marker");
        assert!(lines[marker + 3].ends_with("13-org-test.ts"));
    }

    #[test]
    fn live_metadata_lines_default_to_empty() {
        let segments = vec![segment(1, 2.0), segment(2, 2.0)];
        let metadata = vec![r#"[{"category_id":7}]"#.to_string()];
        let playlist = build_live_playlist(&segments, "/p/", &metadata);

        let body = playlist.body;
        assert!(body.contains(r#"#BOUNDING-BOX:[{"category_id":7}]"#));
        assert_eq!(body.matches("#BOUNDING-BOX:").count(), 2);
        assert!(body.contains("#BOUNDING-BOX:[]"));
    }

    #[test]
    fn vod_target_duration_is_sum() {
        let segments = vec![segment(0, 4.2), segment(1, 4.2), segment(2, 4.2)];
        let playlist = build_vod_playlist(&segments);

        // ceil(12.6) == 13
        assert!(playlist.body.contains("#EXT-X-TARGETDURATION:13"));
        assert!(playlist.body.contains("#EXT-X-PLAYLIST-TYPE:VOD"));
        assert!(playlist.body.contains("#EXT-X-ALLOW-CACHE:YES"));
        assert!(playlist.body.contains("#EXT-X-MEDIA-SEQUENCE:0"));
        assert!(playlist.body.trim_end().ends_with("#EXT-X-ENDLIST"));
        assert!((playlist.duration - 12.6).abs() < 1e-9);
    }

    #[test]
    fn vod_uses_adopted_file_names() {
        let mut seg = segment(0, 4.0);
        seg.stored_key = Some(PathBuf::from("accident/group-1/abc.ts"));
        let playlist = build_vod_playlist(&[seg]);
        assert!(playlist.body.contains("\nabc.ts\n"));
    }

    #[test]
    fn empty_live_playlist_is_well_formed() {
        let playlist = build_live_playlist(&[], "/p/", &[]);
        assert!(playlist.body.contains("#EXT-X-MEDIA-SEQUENCE:0"));
        assert!(playlist.body.contains("#EXT-X-TARGETDURATION:0"));
        assert_eq!(playlist.duration, 0.0);
    }
}
