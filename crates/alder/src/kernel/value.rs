use std::fmt;

use num_bigint::{BigInt, BigUint, Sign};
use num_traits::{ToPrimitive, Zero};
use serde::{Deserialize, Serialize};

/// Tag name wrapping every record value.
pub const RECORD_TAG: &str = "Elm_Record";
/// Tag name wrapping every string value.
pub const STRING_TAG: &str = "String";
/// Tag name wrapping every function (closure) value.
pub const FUNCTION_TAG: &str = "Function";

/// A kernel value: either a finite byte sequence or an ordered sequence of
/// kernel values.
///
/// This is the only runtime data shape the kernel VM knows. Integers,
/// characters, and tag names are encoded as blobs; everything structured
/// (lists, tuples, records, choice values, closures, whole modules, the
/// persistent environment) is built from nested lists.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Value {
    Blob(Vec<u8>),
    List(Vec<Value>),
}

/// Sign byte opening every encoded integer: `4` for non-negative, `2` for
/// negative. The bare sign bytes double as the boolean values, which is what
/// lets kernel `negate` serve both numbers and booleans.
const POSITIVE_SIGN: u8 = 4;
const NEGATIVE_SIGN: u8 = 2;

impl Value {
    /// The empty list value, used as the unit value and as the fallback
    /// result of partial kernel operations.
    pub fn empty_list() -> Self {
        Self::List(Vec::new())
    }

    pub fn true_value() -> Self {
        Self::Blob(vec![POSITIVE_SIGN])
    }

    pub fn false_value() -> Self {
        Self::Blob(vec![NEGATIVE_SIGN])
    }

    pub fn bool_value(b: bool) -> Self {
        if b { Self::true_value() } else { Self::false_value() }
    }

    /// Whether this value is the canonical true value. Anything else --
    /// including the false value and every non-boolean -- selects the false
    /// branch of a conditional.
    pub fn is_true(&self) -> bool {
        matches!(self, Self::Blob(bytes) if bytes.as_slice() == [POSITIVE_SIGN])
    }

    /// Encodes an integer as a blob: one sign byte followed by the magnitude
    /// in big-endian bytes.
    pub fn from_bigint(n: &BigInt) -> Self {
        let (sign, magnitude) = match n.sign() {
            Sign::Minus => (NEGATIVE_SIGN, n.magnitude().to_bytes_be()),
            Sign::NoSign | Sign::Plus => (POSITIVE_SIGN, n.magnitude().to_bytes_be()),
        };
        let mut bytes = Vec::with_capacity(magnitude.len() + 1);
        bytes.push(sign);
        bytes.extend_from_slice(&magnitude);
        Self::Blob(bytes)
    }

    pub fn from_i64(n: i64) -> Self {
        Self::from_bigint(&BigInt::from(n))
    }

    /// Decodes an integer blob. Returns `None` for lists, empty blobs, and
    /// blobs whose first byte is not a sign byte.
    pub fn as_bigint(&self) -> Option<BigInt> {
        let Self::Blob(bytes) = self else { return None };
        let (&sign_byte, magnitude) = bytes.split_first()?;
        let magnitude = BigUint::from_bytes_be(magnitude);
        match sign_byte {
            POSITIVE_SIGN => Some(BigInt::from_biguint(Sign::Plus, magnitude)),
            NEGATIVE_SIGN if magnitude.is_zero() => Some(BigInt::zero()),
            NEGATIVE_SIGN => Some(BigInt::from_biguint(Sign::Minus, magnitude)),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_bigint()?.to_i64()
    }

    /// Characters are encoded exactly like their code point as an integer.
    pub fn from_char(c: char) -> Self {
        Self::from_i64(i64::from(u32::from(c)))
    }

    /// A bare UTF-8 blob, used for names: declaration names, tag names,
    /// field names, environment entry names.
    pub fn name(s: &str) -> Self {
        Self::Blob(s.as_bytes().to_vec())
    }

    /// Decodes a bare UTF-8 blob back into a string.
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Self::Blob(bytes) => std::str::from_utf8(bytes).ok(),
            Self::List(_) => None,
        }
    }

    /// A source string value: `[Tag("String"), [utf8-blob]]`.
    pub fn string(s: &str) -> Self {
        Self::tag(STRING_TAG, vec![Self::Blob(s.as_bytes().to_vec())])
    }

    /// Decodes a string value produced by [`Value::string`].
    pub fn as_string(&self) -> Option<String> {
        let (tag, args) = self.as_tagged()?;
        if tag != STRING_TAG {
            return None;
        }
        match args {
            [Self::Blob(bytes)] => String::from_utf8(bytes.clone()).ok(),
            _ => None,
        }
    }

    /// A tagged value: `[Tag(name), [args...]]`. Choice-type values, strings,
    /// records, and closures all share this shape.
    pub fn tag(name: &str, args: Vec<Self>) -> Self {
        Self::List(vec![Self::name(name), Self::List(args)])
    }

    /// Destructures a tagged value into its tag name and arguments.
    pub fn as_tagged(&self) -> Option<(&str, &[Self])> {
        let Self::List(items) = self else { return None };
        match items.as_slice() {
            [tag, Self::List(args)] => Some((tag.as_name()?, args.as_slice())),
            _ => None,
        }
    }

    /// A record value: fields are sorted lexicographically by name, which is
    /// the global representation invariant record equality relies on.
    pub fn record(mut fields: Vec<(String, Self)>) -> Self {
        fields.sort_by(|(a, _), (b, _)| a.cmp(b));
        let pairs = fields
            .into_iter()
            .map(|(field_name, value)| Self::List(vec![Self::name(&field_name), value]))
            .collect();
        Self::tag(RECORD_TAG, vec![Self::List(pairs)])
    }

    pub fn as_list(&self) -> Option<&[Self]> {
        match self {
            Self::List(items) => Some(items.as_slice()),
            Self::Blob(_) => None,
        }
    }

    /// Rough size measure used by the reduction heuristics: one unit per
    /// node, plus one per blob byte.
    pub fn size_units(&self) -> usize {
        match self {
            Self::Blob(bytes) => 1 + bytes.len(),
            Self::List(items) => 1 + items.iter().map(Self::size_units).sum::<usize>(),
        }
    }
}

impl fmt::Display for Value {
    /// Compact structural rendering for diagnostics; the user-facing Elm-like
    /// rendering lives in the session layer.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Blob(bytes) => {
                if let Some(n) = self.as_bigint() {
                    write!(f, "{n}")
                } else if let Some(s) = self.as_name() {
                    write!(f, "{s:?}")
                } else {
                    write!(f, "0x")?;
                    for b in bytes {
                        write!(f, "{b:02x}")?;
                    }
                    Ok(())
                }
            }
            Self::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use num_bigint::BigInt;
    use pretty_assertions::assert_eq;

    use super::Value;

    #[test]
    fn integer_round_trip() {
        for n in [0i64, 1, -1, 127, 128, 255, 256, -256, 70000, i64::MAX, i64::MIN + 1] {
            let value = Value::from_i64(n);
            assert_eq!(value.as_bigint(), Some(BigInt::from(n)), "round-trip of {n}");
        }
    }

    #[test]
    fn true_is_the_sign_of_zero() {
        // negate flips the sign byte, so boolean negation is integer negation
        assert_eq!(Value::true_value(), Value::Blob(vec![4]));
        assert_eq!(Value::false_value(), Value::Blob(vec![2]));
        assert!(Value::true_value().is_true());
        assert!(!Value::false_value().is_true());
        assert!(!Value::empty_list().is_true());
    }

    #[test]
    fn string_round_trip() {
        let value = Value::string("héllo");
        assert_eq!(value.as_string().as_deref(), Some("héllo"));
        assert_eq!(value.as_tagged().map(|(tag, _)| tag), Some("String"));
    }

    #[test]
    fn record_fields_sorted_lexicographically() {
        let record = Value::record(vec![
            ("b".to_owned(), Value::from_i64(2)),
            ("a".to_owned(), Value::from_i64(1)),
        ]);
        let (tag, args) = record.as_tagged().unwrap();
        assert_eq!(tag, "Elm_Record");
        let [Value::List(pairs)] = args else {
            panic!("record args should be a single list, got {args:?}")
        };
        let names: Vec<_> = pairs
            .iter()
            .map(|pair| pair.as_list().unwrap()[0].as_name().unwrap().to_owned())
            .collect();
        assert_eq!(names, ["a", "b"]);
    }
}
