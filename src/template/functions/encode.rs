use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use hmac::{Hmac, Mac};
use md5::Md5;
use minijinja::{Environment, Error, ErrorKind};
use sha2::{Digest, Sha256};

pub fn register(env: &mut Environment<'static>) {
    env.add_function("urlEncode", |s: String| url::form_urlencoded::byte_serialize(s.as_bytes()).collect::<String>());
    env.add_function("urlDecode", url_decode);
    env.add_function("base64Encode", |s: String| B64.encode(s.as_bytes()));
    env.add_function("base64Decode", base64_decode);
    env.add_function("sha256", |s: String| format!("{:x}", Sha256::digest(s.as_bytes())));
    env.add_function("md5", |s: String| format!("{:x}", Md5::digest(s.as_bytes())));
    env.add_function("hmacSHA256", hmac_sha256);
}

/// Percent-decode (and `+` → space, matching `x-www-form-urlencoded`).
fn url_decode(s: String) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => {
                if let Ok(byte) = u8::from_str_radix(&s[i + 1..i + 3], 16) {
                    out.push(byte);
                    i += 3;
                } else {
                    out.push(bytes[i]);
                    i += 1;
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8(out).unwrap_or(s)
}

fn base64_decode(s: String) -> Result<String, Error> {
    let bytes = B64
        .decode(s.as_bytes())
        .map_err(|e| Error::new(ErrorKind::InvalidOperation, e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| Error::new(ErrorKind::InvalidOperation, e.to_string()))
}

fn hmac_sha256(key: String, message: String) -> Result<String, Error> {
    type HmacSha256 = Hmac<Sha256>;
    let mut mac = HmacSha256::new_from_slice(key.as_bytes())
        .map_err(|e| Error::new(ErrorKind::InvalidOperation, e.to_string()))?;
    mac.update(message.as_bytes());
    Ok(format!("{:x}", mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base64_round_trip() {
        let encoded = B64.encode(b"hello");
        assert_eq!(base64_decode(encoded).unwrap(), "hello");
    }

    #[test]
    fn test_sha256_known_vector() {
        let digest = format!("{:x}", Sha256::digest(b""));
        assert_eq!(digest, "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b85");
    }
}
