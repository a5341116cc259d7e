//! Base64 and MIME helpers shared by every adapter

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
use bytes::Bytes;

use crate::types::Media;

/// Fallback content type when neither the provider nor the bytes say
pub(crate) const OCTET_STREAM: &str = "application/octet-stream";

/// Split a `data:<mime>;base64,` prefix off a payload
///
/// Returns the declared MIME type (if the input was a data URI) and the
/// bare base64 text.
pub fn split_data_uri(input: &str) -> (Option<&str>, &str) {
    let trimmed = input.trim();

    if let Some(rest) = trimmed.strip_prefix("data:")
        && let Some((meta, payload)) = rest.split_once(',')
        && let Some(mime) = meta.strip_suffix(";base64")
    {
        let mime = mime.split(';').next().unwrap_or(mime);
        return ((!mime.is_empty()).then_some(mime), payload);
    }

    (None, trimmed)
}

/// Decode base64 text, accepting an optional data URI prefix
///
/// Padded, unpadded and URL-safe alphabets are all accepted since
/// providers disagree on which one they emit.
///
/// # Errors
///
/// Returns the decoder error of the standard alphabet if no variant
/// decodes the payload
pub fn decode_base64(input: &str) -> Result<Bytes, base64::DecodeError> {
    let (_, payload) = split_data_uri(input);
    let payload: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();

    STANDARD
        .decode(&payload)
        .or_else(|err| {
            STANDARD_NO_PAD
                .decode(&payload)
                .or_else(|_| URL_SAFE.decode(&payload))
                .or_else(|_| URL_SAFE_NO_PAD.decode(&payload))
                .map_err(|_| err)
        })
        .map(Bytes::from)
}

/// Encode bytes with the standard padded alphabet
pub fn encode_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Build a `data:` URI for inline delivery to providers that take URLs
pub fn data_uri(mime: &str, bytes: &[u8]) -> String {
    format!("data:{mime};base64,{}", encode_base64(bytes))
}

/// Guess a MIME type from magic bytes
pub fn sniff_content_type(bytes: &[u8]) -> Option<&'static str> {
    infer::get(bytes).map(|kind| kind.mime_type())
}

/// Decode an inline base64 media payload
///
/// Content type precedence: data URI prefix, then `declared`, then
/// magic-byte sniffing.
///
/// # Errors
///
/// Returns the base64 decoder error if the payload is not valid base64
pub fn decode_media(input: &str, declared: Option<&str>) -> Result<Media, base64::DecodeError> {
    let (uri_mime, _) = split_data_uri(input);
    let bytes = decode_base64(input)?;

    let content_type = uri_mime
        .or(declared)
        .map(str::to_string)
        .or_else(|| sniff_content_type(&bytes).map(str::to_string))
        .unwrap_or_else(|| OCTET_STREAM.to_string());

    Ok(Media { bytes, content_type })
}

/// File extension for a MIME type, used to name multipart parts
pub fn extension_for(mime: &str) -> &'static str {
    match mime {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "video/mp4" => "mp4",
        _ => "bin",
    }
}
