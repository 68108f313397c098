//! Response Codec
//!
//! Serializes a generation result together with the input that produced it:
//!
//! ```text
//! {
//!   "<label_key>": "<input>",
//!   "<output_key>": <result>
//! }
//! ```
//!
//! Output is pretty-printed with 2-space indentation. Non-ASCII text is
//! written as UTF-8, not `\u` escaped. Keys keep their order: the label
//! first, then the result, whose own object keys stay in the order the
//! backend produced them.

use serde::ser::{Error as _, SerializeMap};
use serde::{Serialize, Serializer};
use serde_json::ser::PrettyFormatter;

const INDENT: &[u8] = b"  ";

struct Envelope<'a, T: ?Sized> {
    label_key: &'a str,
    input: &'a str,
    output_key: &'a str,
    result: &'a T,
}

impl<T: Serialize + ?Sized> Serialize for Envelope<'_, T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry(self.label_key, self.input)?;
        map.serialize_entry(self.output_key, self.result)?;
        map.end()
    }
}

/// Encode `{label_key: input, output_key: result}`.
///
/// Any error raised while serializing `result` is returned unchanged.
pub fn encode_envelope<T: Serialize + ?Sized>(
    label_key: &str,
    input: &str,
    output_key: &str,
    result: &T,
) -> Result<String, serde_json::Error> {
    let envelope = Envelope {
        label_key,
        input,
        output_key,
        result,
    };

    let mut buf = Vec::with_capacity(128);
    let mut serializer =
        serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(INDENT));
    envelope.serialize(&mut serializer)?;

    String::from_utf8(buf).map_err(serde_json::Error::custom)
}
