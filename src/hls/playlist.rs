//! Playlist analysis and rewriting
//!
//! Masters arrive with proprietary URI schemes (`mlhls://…` for YouTube,
//! `nfhls://…` for Netflix) and have to be rewritten so a stock media
//! player can fetch everything from the loopback endpoint. Media
//! playlists may arrive in YouTube's condensed form and are expanded
//! when served.

use std::sync::OnceLock;

use regex::Regex;

/// Derive the local cache path for a playlist URI: the sender prefix is
/// stripped and the result always starts with `/`.
#[must_use]
pub fn uri_path(uri: &str, uri_prefix: &str) -> String {
    let rest = uri.strip_prefix(uri_prefix).unwrap_or_else(|| {
        // Fall back to the path portion after scheme and host
        uri.find("://")
            .and_then(|scheme| {
                let after = &uri[scheme + 3..];
                after.find('/').map(|slash| &after[slash..])
            })
            .unwrap_or(uri)
    });

    if rest.starts_with('/') {
        rest.to_string()
    } else {
        format!("/{rest}")
    }
}

/// Rewrite every sender-prefixed URI in a master playlist to the
/// loopback prefix
#[must_use]
pub fn rewrite_master(text: &str, uri_prefix: &str, local_prefix: &str) -> String {
    text.replace(uri_prefix, local_prefix)
}

/// Enumerate the child playlist URIs of a master: variant streams plus
/// media renditions, resolved against `uri_prefix`, first occurrence
/// wins.
#[must_use]
pub fn child_uris(text: &str, uri_prefix: &str) -> Vec<String> {
    let Ok(master) = m3u8_rs::parse_master_playlist_res(text.as_bytes()) else {
        tracing::warn!("master playlist did not parse; no children enumerated");
        return Vec::new();
    };

    let mut seen = std::collections::HashSet::new();
    let mut uris = Vec::new();

    let variant_uris = master.variants.iter().map(|v| v.uri.clone());
    let rendition_uris = master.alternatives.iter().filter_map(|alt| alt.uri.clone());

    for uri in variant_uris.chain(rendition_uris) {
        let absolute = if uri.contains("://") {
            uri
        } else if let Some(rel) = uri.strip_prefix('/') {
            format!("{uri_prefix}/{rel}")
        } else {
            format!("{uri_prefix}/{uri}")
        };
        if seen.insert(absolute.clone()) {
            uris.push(absolute);
        }
    }

    uris
}

/// Count the segments of a media playlist and sum their durations
#[must_use]
pub fn analyze_media(text: &str) -> Option<(usize, f32)> {
    let playlist = m3u8_rs::parse_media_playlist_res(text.as_bytes()).ok()?;
    let chunks = playlist.segments.len();
    let duration = playlist.segments.iter().map(|s| s.duration).sum();
    Some((chunks, duration))
}

/// Mark the audio rendition matching `code` as the default.
///
/// When an `#EXT-X-MEDIA:TYPE=AUDIO` entry with `LANGUAGE="code"`
/// exists, it gets `DEFAULT=YES,AUTOSELECT=YES` and every other audio
/// entry `DEFAULT=NO`; without a match the master is left untouched.
#[must_use]
pub fn select_language(text: &str, code: &str) -> String {
    let wanted = |line: &str| is_audio_media(line) && attr_value(line, "LANGUAGE") == Some(code);

    if !text.lines().any(|line| wanted(line)) {
        return text.to_string();
    }

    let mut out: Vec<String> = Vec::new();
    for line in text.lines() {
        if wanted(line) {
            let line = set_attr(line, "DEFAULT", "YES");
            out.push(set_attr(&line, "AUTOSELECT", "YES"));
        } else if is_audio_media(line) {
            out.push(set_attr(line, "DEFAULT", "NO"));
        } else {
            out.push(line.to_string());
        }
    }

    let mut result = out.join("\n");
    if text.ends_with('\n') {
        result.push('\n');
    }
    result
}

fn is_audio_media(line: &str) -> bool {
    line.starts_with("#EXT-X-MEDIA:") && line.contains("TYPE=AUDIO")
}

/// Quoted attribute value from an `#EXT-X-MEDIA` line
fn attr_value<'a>(line: &'a str, name: &str) -> Option<&'a str> {
    let key = format!("{name}=\"");
    let at = line.find(&key)?;
    let rest = &line[at + key.len()..];
    let end = rest.find('"')?;
    Some(&rest[..end])
}

/// Replace an unquoted attribute value, appending the attribute when
/// absent
fn set_attr(line: &str, name: &str, value: &str) -> String {
    let key = format!("{name}=");
    if let Some(at) = line.find(&key) {
        let value_start = at + key.len();
        let value_end = line[value_start..]
            .find(',')
            .map_or(line.len(), |comma| value_start + comma);
        format!("{}{}{}", &line[..value_start], value, &line[value_end..])
    } else {
        format!("{line},{key}{value}")
    }
}

/// Expand a condensed YouTube media playlist.
///
/// A playlist starting with
/// `#YT-EXT-CONDENSED-URL:BASE-URI="base",…,PREFIX="p"` abbreviates
/// every segment URI to `p…`; each such line becomes `base/p…`.
#[must_use]
pub fn expand_condensed(text: &str) -> String {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new("#YT-EXT-CONDENSED-URL:BASE-URI=\"(.*)\",PARAMS=.*PREFIX=\"(.*)\"")
            .expect("valid regex literal")
    });

    let Some(groups) = pattern.captures(text) else {
        return text.to_string();
    };
    let (base, prefix) = (&groups[1], &groups[2]);
    if base.is_empty() || prefix.is_empty() {
        return text.to_string();
    }

    text.replace(
        &format!("\n{prefix}"),
        &format!("\n{base}/{prefix}"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const MASTER: &str = "#EXTM3U\n\
#EXT-X-MEDIA:TYPE=AUDIO,GROUP-ID=\"aud\",NAME=\"English\",LANGUAGE=\"en\",DEFAULT=NO,AUTOSELECT=NO,URI=\"mlhls://localhost/x/en.m3u8\"\n\
#EXT-X-MEDIA:TYPE=AUDIO,GROUP-ID=\"aud\",NAME=\"Deutsch\",LANGUAGE=\"de\",DEFAULT=YES,AUTOSELECT=YES,URI=\"mlhls://localhost/x/de.m3u8\"\n\
#EXT-X-STREAM-INF:BANDWIDTH=1280000,AUDIO=\"aud\"\n\
mlhls://localhost/x/sub.m3u8\n";

    const MEDIA: &str = "#EXTM3U\n\
#EXT-X-VERSION:3\n\
#EXT-X-TARGETDURATION:6\n\
#EXTINF:6.0,\n\
seg0.ts\n\
#EXTINF:4.5,\n\
seg1.ts\n\
#EXT-X-ENDLIST\n";

    #[test]
    fn test_uri_path() {
        assert_eq!(
            uri_path("mlhls://localhost/x/sub.m3u8", "mlhls://localhost/x"),
            "/sub.m3u8"
        );
        // Prefix mismatch falls back to the URL path
        assert_eq!(
            uri_path("nfhls://host/path/video.m3u8", "mlhls://other"),
            "/path/video.m3u8"
        );
    }

    #[test]
    fn test_rewrite_master_no_scheme_residue() {
        let rewritten = rewrite_master(MASTER, "mlhls://localhost/x", "http://localhost:7000");
        assert!(!rewritten.contains("mlhls://"));
        assert!(rewritten.contains("http://localhost:7000/sub.m3u8"));
        assert!(rewritten.contains("http://localhost:7000/en.m3u8"));
    }

    #[test]
    fn test_child_uris() {
        let children = child_uris(MASTER, "mlhls://localhost/x");
        assert_eq!(
            children,
            vec![
                "mlhls://localhost/x/sub.m3u8".to_string(),
                "mlhls://localhost/x/en.m3u8".to_string(),
                "mlhls://localhost/x/de.m3u8".to_string(),
            ]
        );
    }

    #[test]
    fn test_child_uris_resolves_relative() {
        let master = "#EXTM3U\n#EXT-X-STREAM-INF:BANDWIDTH=100\nsub.m3u8\n";
        let children = child_uris(master, "mlhls://localhost/x");
        assert_eq!(children, vec!["mlhls://localhost/x/sub.m3u8".to_string()]);
    }

    #[test]
    fn test_analyze_media() {
        let (chunks, duration) = analyze_media(MEDIA).unwrap();
        assert_eq!(chunks, 2);
        assert!((duration - 10.5).abs() < 0.01);
    }

    #[test]
    fn test_select_language_marks_default() {
        let selected = select_language(MASTER, "en");

        let english = selected
            .lines()
            .find(|l| l.contains("LANGUAGE=\"en\""))
            .unwrap();
        assert!(english.contains("DEFAULT=YES"));
        assert!(english.contains("AUTOSELECT=YES"));

        let german = selected
            .lines()
            .find(|l| l.contains("LANGUAGE=\"de\""))
            .unwrap();
        assert!(german.contains("DEFAULT=NO"));
    }

    #[test]
    fn test_select_language_no_match_keeps_defaults() {
        assert_eq!(select_language(MASTER, "fr"), MASTER);
    }

    #[test]
    fn test_expand_condensed() {
        let condensed = "#YT-EXT-CONDENSED-URL:BASE-URI=\"https://r1.example.com/seg\",PARAMS=\"sq\",PREFIX=\"sq/\"\n\
#EXTINF:5.0,\n\
sq/1/file.ts\n\
#EXTINF:5.0,\n\
sq/2/file.ts\n";

        let expanded = expand_condensed(condensed);
        assert!(expanded.contains("\nhttps://r1.example.com/seg/sq/1/file.ts"));
        assert!(expanded.contains("\nhttps://r1.example.com/seg/sq/2/file.ts"));
    }

    #[test]
    fn test_expand_condensed_passthrough() {
        assert_eq!(expand_condensed(MEDIA), MEDIA);
    }
}
