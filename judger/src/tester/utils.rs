use difference::{Changeset, Difference};
use std::borrow::Cow;

/// Largest `lines(got) * lines(expected)` a full line diff is computed for.
/// The diff needs a table of that many cells.
const MAX_DIFF_CELLS: usize = 1 << 20;

/// Lines quoted in a bounded diagnostic are cut to this many characters.
const MAX_SHOWN_LINE_CHARS: usize = 200;

/// Generate a line diff of two Strings, `+` marking lines only `expected`
/// has and `-` marking lines only `got` has.
///
/// Outputs too large to diff in full get [`first_difference`] instead.
pub fn diff(got: &str, expected: &str) -> String {
    let cells = got
        .split('\n')
        .count()
        .saturating_mul(expected.split('\n').count());
    if cells > MAX_DIFF_CELLS {
        return first_difference(got, expected);
    }

    let changeset = Changeset::new(got, expected, "\n");
    let mut change_string = String::new();

    let mut add_diff_ln = |ic: char, s: &str| {
        for l in s.lines() {
            change_string.push(ic);
            change_string.push(' ');
            change_string.push_str(l);
            change_string.push('\n');
        }
    };

    for diff in changeset.diffs {
        match diff {
            Difference::Same(s) => add_diff_ln(' ', &s),
            Difference::Add(s) => add_diff_ln('+', &s),
            Difference::Rem(s) => add_diff_ln('-', &s),
        }
    }

    change_string
}

/// Report only the first line where `got` and `expected` differ.
pub fn first_difference(got: &str, expected: &str) -> String {
    let mut got_lines = got.split('\n');
    let mut expected_lines = expected.split('\n');
    let mut line = 1usize;
    loop {
        match (got_lines.next(), expected_lines.next()) {
            (Some(g), Some(e)) if g == e => line += 1,
            (None, None) => return "outputs differ only in line endings\n".into(),
            (g, e) => {
                return format!(
                    "first difference at line {}\n- {}\n+ {}\n",
                    line,
                    g.map_or(Cow::Borrowed("<end of output>"), shorten),
                    e.map_or(Cow::Borrowed("<end of output>"), shorten),
                )
            }
        }
    }
}

fn shorten(line: &str) -> Cow<'_, str> {
    match line.char_indices().nth(MAX_SHOWN_LINE_CHARS) {
        Some((cut, _)) => Cow::Owned(format!("{}...", &line[..cut])),
        None => Cow::Borrowed(line),
    }
}

/// Compare program output with the expected answer, ignoring leading and
/// trailing whitespace on both sides and nothing else.
pub fn outputs_match(got: &str, expected: &str) -> bool {
    got.trim().as_bytes() == expected.trim().as_bytes()
}

/// Describe a signal code (>=0).
#[cfg(unix)]
pub fn strsignal(signal: i32) -> Cow<'static, str> {
    // SAFETY: `strsignal` returns a pointer to a static or thread-local
    // string, which is copied out immediately.
    let c_buf = unsafe { libc::strsignal(signal as libc::c_int) };
    if c_buf.is_null() {
        return Cow::Owned(format!("Unknown signal {}", signal));
    }
    let c_str = unsafe { std::ffi::CStr::from_ptr(c_buf) };
    Cow::Owned(c_str.to_string_lossy().into_owned())
}

#[cfg(not(unix))]
pub fn strsignal(signal: i32) -> Cow<'static, str> {
    Cow::Owned(format!("signal {}", signal))
}
