//! Media classification by extension, with a magic-byte fallback

use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::models::MediaType;

pub const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "mkv", "avi", "mov", "wmv", "flv", "webm", "m4v", "mpg", "mpeg", "3gp", "ogv", "ts",
    "mts", "m2ts", "vob", "divx", "xvid", "rm", "rmvb", "asf",
];

pub const AUDIO_EXTENSIONS: &[&str] = &[
    "mp3", "flac", "wav", "aac", "ogg", "m4a", "wma", "opus", "ape", "alac", "aiff", "aif", "ac3",
    "dts", "mka", "mpc", "tta", "wv", "ra", "mid", "midi",
];

pub const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "bmp", "webp", "svg", "tiff", "tif", "heic", "heif", "raw", "cr2",
    "nef", "arw", "dng", "orf", "rw2", "pef", "srw", "ico", "psd", "xcf", "jxr", "avif", "jfif",
];

pub const DOCUMENT_EXTENSIONS: &[&str] = &[
    "pdf", "epub", "mobi", "azw3", "djvu", "cbr", "cbz", "cb7", "cbt", "doc", "docx", "txt", "rtf",
    "odt",
];

pub const STREAMING_EXTENSIONS: &[&str] = &["m3u8", "m3u", "pls", "strm", "asx", "xspf"];

/// Bytes read from the head of a file for sniffing
const SNIFF_LEN: u64 = 16;

const OCTET_STREAM: &str = "application/octet-stream";

/// Lowercased extension of `path`, without the dot
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
}

/// Classify a path into a coarse media type.
///
/// Extension tables win; unknown extensions fall back to content sniffing.
/// Sniffing failures degrade to [`MediaType::Other`].
pub fn classify(path: &Path) -> MediaType {
    if let Some(media_type) = extension_of(path).and_then(|ext| MediaType::from_extension(&ext)) {
        return media_type;
    }
    sniff_mime(path)
        .map(MediaType::from_mime)
        .unwrap_or(MediaType::Other)
}

/// True if the extension is one of video, audio, image or streaming.
/// Documents classify but are not scanned by default.
pub fn is_supported_media(path: &Path) -> bool {
    extension_of(path)
        .map(|ext| is_supported_extension(&ext))
        .unwrap_or(false)
}

fn is_supported_extension(ext: &str) -> bool {
    VIDEO_EXTENSIONS.contains(&ext)
        || AUDIO_EXTENSIONS.contains(&ext)
        || IMAGE_EXTENSIONS.contains(&ext)
        || STREAMING_EXTENSIONS.contains(&ext)
}

/// The extension set used to filter discovery by default
pub fn supported_extensions() -> HashSet<String> {
    VIDEO_EXTENSIONS
        .iter()
        .chain(AUDIO_EXTENSIONS)
        .chain(IMAGE_EXTENSIONS)
        .chain(STREAMING_EXTENSIONS)
        .map(|s| s.to_string())
        .collect()
}

/// Best-effort MIME type: magic bytes first, then by extension
pub fn detect_mime_type(path: &Path) -> String {
    if let Some(mime) = sniff_mime(path) {
        return mime.to_string();
    }
    let Some(ext) = extension_of(path) else {
        return OCTET_STREAM.to_string();
    };
    if let Some(mime) = media_mime_override(&ext) {
        return mime.to_string();
    }
    mime_guess::from_ext(&ext)
        .first()
        .map(|m| m.to_string())
        .unwrap_or_else(|| OCTET_STREAM.to_string())
}

/// Read the head of the file and match it against known signatures
pub fn sniff_mime(path: &Path) -> Option<&'static str> {
    let file = File::open(path).ok()?;
    let mut head = Vec::with_capacity(SNIFF_LEN as usize);
    file.take(SNIFF_LEN).read_to_end(&mut head).ok()?;
    sniff_bytes(&head)
}

/// Match a file header against known container signatures
pub fn sniff_bytes(head: &[u8]) -> Option<&'static str> {
    let at = |offset: usize, sig: &[u8]| head.get(offset..offset + sig.len()) == Some(sig);

    if at(4, b"ftyp") {
        return Some(match head.get(8..12) {
            Some(b"M4A ") | Some(b"M4B ") => "audio/mp4",
            Some(b"heic") | Some(b"heix") | Some(b"mif1") => "image/heic",
            Some(b"avif") => "image/avif",
            Some(b"qt  ") => "video/quicktime",
            Some(b"3gp4") | Some(b"3gp5") => "video/3gpp",
            _ => "video/mp4",
        });
    }
    if at(0, b"RIFF") {
        return match head.get(8..12) {
            Some(b"AVI ") => Some("video/x-msvideo"),
            Some(b"WAVE") => Some("audio/wav"),
            Some(b"WEBP") => Some("image/webp"),
            _ => None,
        };
    }
    if at(0, b"FORM") && (at(8, b"AIFF") || at(8, b"AIFC")) {
        return Some("audio/aiff");
    }

    let mime = if at(0, &[0x1A, 0x45, 0xDF, 0xA3]) {
        "video/x-matroska"
    } else if at(0, b"FLV\x01") {
        "video/x-flv"
    } else if at(0, &[0x30, 0x26, 0xB2, 0x75, 0x8E, 0x66, 0xCF, 0x11]) {
        "video/x-ms-asf"
    } else if at(0, &[0x00, 0x00, 0x01, 0xBA]) || at(0, &[0x00, 0x00, 0x01, 0xB3]) {
        "video/mpeg"
    } else if at(0, b"ID3") || at(0, &[0xFF, 0xFB]) || at(0, &[0xFF, 0xF3]) || at(0, &[0xFF, 0xF2])
    {
        "audio/mpeg"
    } else if at(0, b"fLaC") {
        "audio/flac"
    } else if at(0, b"OggS") {
        "audio/ogg"
    } else if at(0, b"MThd") {
        "audio/midi"
    } else if at(0, &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        "image/png"
    } else if at(0, &[0xFF, 0xD8, 0xFF]) {
        "image/jpeg"
    } else if at(0, b"GIF87a") || at(0, b"GIF89a") {
        "image/gif"
    } else if at(0, b"II*\0") || at(0, b"MM\0*") {
        "image/tiff"
    } else if at(0, b"8BPS") {
        "image/vnd.adobe.photoshop"
    } else if at(0, b"%PDF-") {
        "application/pdf"
    } else {
        return None;
    };
    Some(mime)
}

/// Media extensions the general MIME registry lacks or maps to a non-media type
fn media_mime_override(ext: &str) -> Option<&'static str> {
    let mime = match ext {
        "mka" => "audio/x-matroska",
        "ape" => "audio/x-ape",
        "wv" => "audio/x-wavpack",
        "mpc" => "audio/x-musepack",
        "tta" => "audio/x-tta",
        "alac" => "audio/x-alac",
        "dts" => "audio/vnd.dts",
        "ts" | "mts" | "m2ts" => "video/mp2t",
        "rmvb" => "application/vnd.rn-realmedia-vbr",
        "asf" => "video/x-ms-asf",
        "raw" => "image/x-raw",
        "cr2" => "image/x-canon-cr2",
        "nef" => "image/x-nikon-nef",
        "arw" => "image/x-sony-arw",
        "dng" => "image/x-adobe-dng",
        "orf" => "image/x-olympus-orf",
        "rw2" => "image/x-panasonic-rw2",
        "pef" => "image/x-pentax-pef",
        "srw" => "image/x-samsung-srw",
        "m3u8" => "application/x-mpegURL",
        "strm" => "application/x-stream",
        _ => return None,
    };
    Some(mime)
}
