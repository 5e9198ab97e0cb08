//! Binary export format for sharing a profile as a single `.randomizer` file.
//!
//! Layout: the `sdvpr_v1_packed;` header, then two length-prefixed gzip
//! sections (big-endian `u32` lengths). The first holds the custom template
//! JSON and is empty for predefined templates; the second holds the save string.
use flate2::{Compression, read::GzDecoder, write::GzEncoder};
use std::io::{Read, Write};
use thiserror::Error;

use crate::constants::PACKED_FORMAT_HEADER;
use crate::save::{SaveError, SavedData, deserialize_save_data};
use crate::template::Template;

#[derive(Debug, Error)]
pub enum PackedError {
    #[error("missing packed profile header")]
    Header,
    #[error("packed profile is truncated")]
    Truncated,
    #[error("section of {0} bytes does not fit the length prefix")]
    Oversized(usize),
    #[error("compression failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("packed section is not UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("packed template is invalid: {0}")]
    Template(#[source] serde_json::Error),
    #[error(transparent)]
    Save(#[from] SaveError),
}

/// Decoded contents of a packed profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnpackedProfile {
    pub template: Option<Template>,
    pub save: SavedData,
}

fn compress(data: &[u8]) -> Result<Vec<u8>, PackedError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

fn decompress(data: &[u8]) -> Result<String, PackedError> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(String::from_utf8(out)?)
}

fn push_section(out: &mut Vec<u8>, section: &[u8]) -> Result<(), PackedError> {
    let len = u32::try_from(section.len()).map_err(|_| PackedError::Oversized(section.len()))?;
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(section);
    Ok(())
}

fn take_section<'a>(bytes: &mut &'a [u8]) -> Result<&'a [u8], PackedError> {
    let current: &'a [u8] = bytes;
    let (len, rest) = current
        .split_first_chunk::<4>()
        .ok_or(PackedError::Truncated)?;
    let len = usize::try_from(u32::from_be_bytes(*len)).map_err(|_| PackedError::Truncated)?;
    if rest.len() < len {
        return Err(PackedError::Truncated);
    }
    let (section, rest) = rest.split_at(len);
    *bytes = rest;
    Ok(section)
}

/// Pack a serialized save (and the custom template it needs, if any).
///
/// # Errors
///
/// Returns an error if compression or template serialization fails.
pub fn pack_profile(save: &str, template: Option<&Template>) -> Result<Vec<u8>, PackedError> {
    let mut out = PACKED_FORMAT_HEADER.to_vec();
    match template {
        Some(template) => {
            let json = template.to_json().map_err(PackedError::Template)?;
            push_section(&mut out, &compress(json.as_bytes())?)?;
        }
        None => push_section(&mut out, &[])?,
    }
    push_section(&mut out, &compress(save.as_bytes())?)?;
    Ok(out)
}

/// Unpack bytes produced by [`pack_profile`].
///
/// # Errors
///
/// Returns an error on a wrong header, truncated sections, corrupt gzip
/// data, or contents that fail to parse.
pub fn unpack_profile(bytes: &[u8]) -> Result<UnpackedProfile, PackedError> {
    let mut rest = bytes
        .strip_prefix(PACKED_FORMAT_HEADER)
        .ok_or(PackedError::Header)?;

    let template_section = take_section(&mut rest)?;
    let template = if template_section.is_empty() {
        None
    } else {
        let json = decompress(template_section)?;
        Some(Template::from_json(&json).map_err(PackedError::Template)?)
    };

    let save_section = take_section(&mut rest)?;
    let save = deserialize_save_data(&decompress(save_section)?)?;
    if !rest.is_empty() {
        log::warn!("ignoring {} trailing bytes after packed profile", rest.len());
    }

    Ok(UnpackedProfile { template, save })
}
