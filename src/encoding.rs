use chardetng::EncodingDetector;
use encoding_rs::{Encoding, UTF_8, UTF_16BE, UTF_16LE};

/// Decoded file text plus the encoding the bytes arrived in, so a commit
/// can encode the rewritten file back into the same representation and
/// untouched lines keep their original bytes.
#[derive(Debug, Clone)]
pub struct DecodedFile {
    pub text: String,
    pub encoding: &'static Encoding,
}

pub fn decode(bytes: &[u8]) -> DecodedFile {
    let encoding = sniff(bytes);
    let (text, _, _) = encoding.decode(bytes);
    DecodedFile {
        text: text.into_owned(),
        encoding,
    }
}

pub fn encode(text: &str, encoding: &'static Encoding) -> Vec<u8> {
    let (bytes, _, _) = encoding.encode(text);
    bytes.into_owned()
}

/// BOM first, then strict UTF-8, then the statistical detector. Plain ASCII
/// and well-formed UTF-8 never reach the detector.
fn sniff(bytes: &[u8]) -> &'static Encoding {
    if let Some(encoding) = bom_encoding(bytes) {
        return encoding;
    }
    if std::str::from_utf8(bytes).is_ok() {
        return UTF_8;
    }

    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    detector.guess(None, true)
}

fn bom_encoding(bytes: &[u8]) -> Option<&'static Encoding> {
    if bytes.starts_with(&[0xEF, 0xBB, 0xBF]) {
        return Some(UTF_8);
    }
    if bytes.starts_with(&[0xFF, 0xFE]) {
        return Some(UTF_16LE);
    }
    if bytes.starts_with(&[0xFE, 0xFF]) {
        return Some(UTF_16BE);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_formed_utf8_without_bom_stays_utf8() {
        let decoded = decode(b"hello world");
        assert_eq!(decoded.encoding.name(), "UTF-8");
        assert_eq!(decoded.text, "hello world");
    }

    #[test]
    fn bom_wins_over_the_detector() {
        let decoded = decode(&[0xFF, 0xFE, 0x61, 0x00]);
        assert_eq!(decoded.encoding.name(), "UTF-16LE");
        assert_eq!(decoded.text, "a");
    }

    #[test]
    fn legacy_single_byte_text_round_trips() {
        let bytes = b"caf\xe9 au lait";
        let decoded = decode(bytes);
        assert!(decoded.text.contains('\u{e9}'));
        assert_eq!(encode(&decoded.text, decoded.encoding), bytes);
    }
}
