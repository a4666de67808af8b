//! `codec::*`: base64, URL and hex encodings, JSON and digests
//!
//! Byte-oriented results (digests, decodings) come back as strings: hex for
//! digests, UTF-8 text for decodings.

use base64::Engine;
use hmac::{Hmac, Mac};
use md5::Md5;
use percent_encoding::{percent_decode_str, utf8_percent_encode, NON_ALPHANUMERIC};
use sha2::{Digest, Sha256};

use super::Registry;
use crate::bytecode::Val;
use crate::proto::Args;
use crate::vm::{Evaluator, RuntimeError, RuntimeResult};

pub(super) fn register(registry: &mut Registry) {
    registry.add("codec::base64_encode", "%s", base64_encode);
    registry.add("codec::base64_decode", "%s", base64_decode);
    registry.add("codec::base64url_encode", "%s", base64url_encode);
    registry.add("codec::base64url_decode", "%s", base64url_decode);
    registry.add("codec::url_encode", "%s", url_encode);
    registry.add("codec::url_decode", "%s", url_decode);
    registry.add("codec::hex_encode", "%s", hex_encode);
    registry.add("codec::hex_decode", "%s", hex_decode);
    registry.add("codec::json_encode", "{%a}{%a%b}", json_encode);
    registry.add("codec::json_decode", "%s", json_decode);
    registry.add("codec::md5", "%s", md5);
    registry.add("codec::sha256", "%s", sha256);
    registry.add("codec::hmac_sha256", "%s%s", hmac_sha256);
}

fn utf8(name: &str, bytes: Vec<u8>) -> RuntimeResult<Val> {
    String::from_utf8(bytes)
        .map(Val::string)
        .map_err(|_| RuntimeError::invalid(format!("{name}: decoded bytes are not valid UTF-8")))
}

// ============================================================================
// Encodings
// ============================================================================

fn base64_encode(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    let encoded = base64::engine::general_purpose::STANDARD.encode(args.str(0)?);
    Ok(Val::string(encoded))
}

fn base64_decode(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(args.str(0)?)
        .map_err(|e| RuntimeError::invalid(format!("codec::base64_decode: {e}")))?;
    utf8("codec::base64_decode", bytes)
}

/// codec::base64url_encode(s) -> String, URL-safe alphabet without padding
fn base64url_encode(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    let encoded = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(args.str(0)?);
    Ok(Val::string(encoded))
}

fn base64url_decode(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    let input = args.str(0)?.trim_end_matches('=');
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(input)
        .map_err(|e| RuntimeError::invalid(format!("codec::base64url_decode: {e}")))?;
    utf8("codec::base64url_decode", bytes)
}

/// codec::url_encode(s) -> String, every non-alphanumeric byte escaped
fn url_encode(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    Ok(Val::string(utf8_percent_encode(args.str(0)?, NON_ALPHANUMERIC).to_string()))
}

fn url_decode(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    let decoded = percent_decode_str(args.str(0)?)
        .decode_utf8()
        .map_err(|_| RuntimeError::invalid("codec::url_decode: decoded bytes are not valid UTF-8"))?;
    Ok(Val::string(decoded))
}

fn hex_encode(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    Ok(Val::string(hex::encode(args.str(0)?)))
}

fn hex_decode(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    let bytes = hex::decode(args.str(0)?).map_err(|e| RuntimeError::invalid(format!("codec::hex_decode: {e}")))?;
    utf8("codec::hex_decode", bytes)
}

// ============================================================================
// JSON
// ============================================================================

/// codec::json_encode(value, [pretty]) -> String
fn json_encode(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    let json = args.get(0).to_json()?;
    let pretty = args.len() > 1 && args.bool(1)?;
    let text = if pretty {
        serde_json::to_string_pretty(&json)
    } else {
        serde_json::to_string(&json)
    };
    text.map(Val::string)
        .map_err(|e| RuntimeError::invalid(format!("codec::json_encode: {e}")))
}

fn json_decode(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    let json: serde_json::Value = serde_json::from_str(args.str(0)?)
        .map_err(|e| RuntimeError::invalid(format!("codec::json_decode: {e}")))?;
    Ok(Val::from_json(&json))
}

// ============================================================================
// Digests
// ============================================================================

/// codec::md5(s) -> String, lowercase hex
fn md5(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    let mut hasher = Md5::new();
    hasher.update(args.str(0)?.as_bytes());
    Ok(Val::string(hex::encode(hasher.finalize())))
}

/// codec::sha256(s) -> String, lowercase hex
fn sha256(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    let mut hasher = Sha256::new();
    hasher.update(args.str(0)?.as_bytes());
    Ok(Val::string(hex::encode(hasher.finalize())))
}

/// codec::hmac_sha256(key, message) -> String, lowercase hex
fn hmac_sha256(_: &mut Evaluator, args: Args<'_>) -> RuntimeResult<Val> {
    type HmacSha256 = Hmac<Sha256>;
    let mut mac = <HmacSha256 as Mac>::new_from_slice(args.str(0)?.as_bytes())
        .map_err(|e| RuntimeError::invalid(format!("codec::hmac_sha256: {e}")))?;
    mac.update(args.str(1)?.as_bytes());
    Ok(Val::string(hex::encode(mac.finalize().into_bytes())))
}
