//! Step outputs: the output map and the sink that hands it to the CI runner.

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::PathBuf;

use crate::errors::OutputError;

/// Output that always holds the raw response text.
pub const RESPONSE_KEY: &str = "response";

pub type OutputMap = BTreeMap<String, String>;

/// Merge the raw response with decoded tool arguments.
///
/// The reserved `response` key always holds `raw_response`. A tool argument
/// with that name is dropped and the returned flag is set so the caller can
/// warn about it.
pub fn build_output_map(raw_response: &str, tool_args: Option<&OutputMap>) -> (OutputMap, bool) {
    let mut output = OutputMap::new();
    output.insert(RESPONSE_KEY.to_string(), raw_response.to_string());

    let mut collided = false;
    for (key, value) in tool_args.into_iter().flatten() {
        if key == RESPONSE_KEY {
            collided = true;
            continue;
        }
        output.insert(key.clone(), value.clone());
    }

    (output, collided)
}

/// Where step outputs are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputSink {
    /// Append to the file named by `GITHUB_OUTPUT`.
    File(PathBuf),
    /// Print `::set-output` workflow commands.
    Stdout,
}

impl OutputSink {
    pub fn from_env() -> Self {
        match std::env::var_os("GITHUB_OUTPUT") {
            Some(path) if !path.is_empty() => OutputSink::File(PathBuf::from(path)),
            _ => OutputSink::Stdout,
        }
    }

    pub fn write(&self, outputs: &OutputMap) -> Result<(), OutputError> {
        match self {
            OutputSink::File(path) => {
                let io_error = |source| OutputError::Io {
                    path: path.clone(),
                    source,
                };
                let mut file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(io_error)?;
                let delimiter = format!("ghadelimiter_{}", uuid::Uuid::new_v4());
                write_file_commands(&mut file, outputs, &delimiter)
            }
            OutputSink::Stdout => {
                let stdout = io::stdout();
                write_workflow_commands(&mut stdout.lock(), outputs)
            }
        }
    }
}

/// `name<<DELIM` / value / `DELIM` blocks, safe for multi-line values.
pub fn write_file_commands<W: Write>(
    writer: &mut W,
    outputs: &OutputMap,
    delimiter: &str,
) -> Result<(), OutputError> {
    for (name, value) in outputs {
        if name.contains(delimiter) || value.contains(delimiter) {
            return Err(OutputError::DelimiterCollision { name: name.clone() });
        }
    }

    let mut buffer = String::new();
    for (name, value) in outputs {
        buffer.push_str(&format!("{}<<{}\n{}\n{}\n", name, delimiter, value, delimiter));
    }
    writer
        .write_all(buffer.as_bytes())
        .map_err(OutputError::Stream)
}

pub fn write_workflow_commands<W: Write>(
    writer: &mut W,
    outputs: &OutputMap,
) -> Result<(), OutputError> {
    for (name, value) in outputs {
        writeln!(
            writer,
            "::set-output name={}::{}",
            escape_property(name),
            escape_data(value)
        )
        .map_err(OutputError::Stream)?;
    }
    Ok(())
}

fn escape_data(value: &str) -> String {
    value
        .replace('%', "%25")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

fn escape_property(value: &str) -> String {
    escape_data(value).replace(':', "%3A").replace(',', "%2C")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn map(entries: &[(&str, &str)]) -> OutputMap {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_build_output_map_without_tool_args() {
        let (output, collided) = build_output_map("R", None);
        assert_eq!(output, map(&[("response", "R")]));
        assert!(!collided);
    }

    #[test]
    fn test_build_output_map_merges_tool_args() {
        let args = map(&[("city", "Paris"), ("score", "8")]);
        let (output, collided) = build_output_map(r#"{"city":"Paris","score":8}"#, Some(&args));
        assert_eq!(
            output,
            map(&[
                ("response", r#"{"city":"Paris","score":8}"#),
                ("city", "Paris"),
                ("score", "8"),
            ])
        );
        assert!(!collided);
    }

    #[test]
    fn test_build_output_map_reserved_field_kept() {
        let args = map(&[("response", "X"), ("k", "v")]);
        let (output, collided) = build_output_map("R", Some(&args));
        assert_eq!(output, map(&[("response", "R"), ("k", "v")]));
        assert!(collided);
    }

    #[test]
    fn test_build_output_map_empty_args() {
        let (output, collided) = build_output_map("", Some(&OutputMap::new()));
        assert_eq!(output, map(&[("response", "")]));
        assert!(!collided);
    }

    #[test]
    fn test_write_file_commands() {
        let outputs = map(&[("response", "line 1\nline 2"), ("score", "8")]);
        let mut buffer = Vec::new();
        write_file_commands(&mut buffer, &outputs, "EOF_1").unwrap();
        assert_eq!(
            String::from_utf8(buffer).unwrap(),
            "response<<EOF_1\nline 1\nline 2\nEOF_1\nscore<<EOF_1\n8\nEOF_1\n"
        );
    }

    #[test]
    fn test_write_file_commands_rejects_delimiter_in_value() {
        let outputs = map(&[("response", "sneaky\nEOF_1\ninjected=1")]);
        let mut buffer = Vec::new();
        let err = write_file_commands(&mut buffer, &outputs, "EOF_1").unwrap_err();
        assert!(matches!(err, OutputError::DelimiterCollision { .. }));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_write_workflow_commands_escapes() {
        let outputs = map(&[("response", "100%\r\ndone")]);
        let mut buffer = Vec::new();
        write_workflow_commands(&mut buffer, &outputs).unwrap();
        assert_eq!(
            String::from_utf8(buffer).unwrap(),
            "::set-output name=response::100%25%0D%0Adone\n"
        );
    }

    #[test]
    fn test_file_sink_appends() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("github_output");
        fs::write(&path, "existing=1\n").unwrap();

        let sink = OutputSink::File(path.clone());
        sink.write(&map(&[("response", "hi")])).unwrap();

        let written = fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("existing=1\nresponse<<ghadelimiter_"));
        assert!(written.contains("\nhi\nghadelimiter_"));
    }

    #[test]
    #[serial_test::serial]
    fn test_sink_from_env() {
        std::env::set_var("GITHUB_OUTPUT", "/tmp/gh_output");
        assert_eq!(
            OutputSink::from_env(),
            OutputSink::File(PathBuf::from("/tmp/gh_output"))
        );
        std::env::remove_var("GITHUB_OUTPUT");
        assert_eq!(OutputSink::from_env(), OutputSink::Stdout);
    }
}
