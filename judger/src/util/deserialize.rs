use serde::{
    de::{self, SeqAccess, Visitor},
    Deserializer,
};
use std::fmt;

/// Deserialize a command line written either as a single shell-like string,
/// like `"gcc main.c -o main"`, or as an argv array, like
/// `["gcc", "main.c", "-o", "main"]`.
///
/// Strings are split with shell quoting rules, but no shell is ever involved
/// when the command runs.
pub fn string_or_argv<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    struct StringOrArgv;

    impl<'de> Visitor<'de> for StringOrArgv {
        type Value = Vec<String>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("command string or array of arguments")
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            shell_words::split(value)
                .map_err(|e| E::custom(format!("bad command `{}`: {}", value, e)))
        }

        fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
        where
            A: SeqAccess<'de>,
        {
            let mut argv = Vec::with_capacity(seq.size_hint().unwrap_or(0));
            while let Some(arg) = seq.next_element::<String>()? {
                argv.push(arg);
            }
            Ok(argv)
        }
    }

    deserializer.deserialize_any(StringOrArgv)
}
