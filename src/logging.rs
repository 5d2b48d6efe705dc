//! Tracing setup with secret redaction.
//!
//! Every formatted log line passes through [`RedactingWriter`] so a Discord
//! token that leaks into an error message never reaches stderr.

use regex::Regex;
use std::io::{self, Write};
use std::sync::Arc;
use tracing_subscriber::{prelude::*, EnvFilter};

/// Filter used when `RUST_LOG` is unset and `DEBUG_MODE` is off
const DEFAULT_FILTER: &str =
    "image_moderator=info,serenity=warn,ort=warn,hyper=warn,h2=error,reqwest=warn,tungstenite=warn,tokio=warn";

/// Regex patterns for redacting sensitive data
pub struct RedactionPatterns {
    token: Regex,
    auth_header: Regex,
    env_assignment: Regex,
}

impl RedactionPatterns {
    /// Initialize all regex patterns
    ///
    /// # Errors
    ///
    /// Returns an error if any regex pattern is invalid
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            token: Regex::new(r"[A-Za-z0-9_-]{24,28}\.[A-Za-z0-9_-]{6}\.[A-Za-z0-9_-]{27,38}")?,
            auth_header: Regex::new(r#"(?i)(authorization"?:?\s*"?bot\s+)[^\s"]+"#)?,
            env_assignment: Regex::new(r"DISCORD_TOKEN=[^\s&]+")?,
        })
    }

    /// Mask tokens in `input`
    #[must_use]
    pub fn redact(&self, input: &str) -> String {
        let output = self
            .auth_header
            .replace_all(input, "${1}[MASKED]")
            .to_string();
        let output = self
            .env_assignment
            .replace_all(&output, "DISCORD_TOKEN=[MASKED]")
            .to_string();
        self.token
            .replace_all(&output, "[DISCORD_TOKEN]")
            .to_string()
    }
}

struct RedactingWriter<W: Write> {
    inner: W,
    patterns: Arc<RedactionPatterns>,
}

impl<W: Write> RedactingWriter<W> {
    const fn new(inner: W, patterns: Arc<RedactionPatterns>) -> Self {
        Self { inner, patterns }
    }
}

impl<W: Write> Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let s = String::from_utf8_lossy(buf);
        let redacted = self.patterns.redact(&s);
        self.inner.write_all(redacted.as_bytes())?;
        // Report the input length; the redacted text may differ in size.
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

struct RedactingMakeWriter<F> {
    make_inner: F,
    patterns: Arc<RedactionPatterns>,
}

impl<F> RedactingMakeWriter<F> {
    const fn new(make_inner: F, patterns: Arc<RedactionPatterns>) -> Self {
        Self {
            make_inner,
            patterns,
        }
    }
}

impl<'a, F, W> tracing_subscriber::fmt::MakeWriter<'a> for RedactingMakeWriter<F>
where
    F: Fn() -> W + 'static,
    W: Write,
{
    type Writer = RedactingWriter<W>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter::new((self.make_inner)(), self.patterns.clone())
    }
}

/// Install the global subscriber writing redacted lines to stderr.
///
/// `RUST_LOG` wins when set; otherwise `DEBUG_MODE=true|1` selects `debug`
/// for everything and the default is a quiet production filter.
pub fn init_logging(patterns: Arc<RedactionPatterns>) {
    let make_writer = RedactingMakeWriter::new(io::stderr, patterns);

    let debug_mode = std::env::var("DEBUG_MODE")
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if debug_mode {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new(DEFAULT_FILTER)
        }
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(make_writer))
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    const FAKE_TOKEN: &str = "MTA5ODc2NTQzMjEwOTg3NjU0Mw.GaBcDe.abcdefghijklmnopqrstuvwxyz0123456789AB";

    #[test]
    fn test_redacts_bare_token() -> Result<(), regex::Error> {
        let patterns = RedactionPatterns::new()?;
        let out = patterns.redact(&format!("login failed for {FAKE_TOKEN} retrying"));
        assert!(!out.contains(FAKE_TOKEN));
        assert!(out.contains("[DISCORD_TOKEN]"));
        assert!(out.ends_with("retrying"));
        Ok(())
    }

    #[test]
    fn test_redacts_authorization_header() -> Result<(), regex::Error> {
        let patterns = RedactionPatterns::new()?;
        let out = patterns.redact("headers: {\"authorization\": \"Bot abc.def.ghi\"}");
        assert!(!out.contains("abc.def.ghi"));
        assert!(out.contains("[MASKED]"));
        Ok(())
    }

    #[test]
    fn test_redacts_env_assignment() -> Result<(), regex::Error> {
        let patterns = RedactionPatterns::new()?;
        let out = patterns.redact("DISCORD_TOKEN=short-secret cargo run");
        assert_eq!(out, "DISCORD_TOKEN=[MASKED] cargo run");
        Ok(())
    }

    #[test]
    fn test_plain_lines_untouched() -> Result<(), regex::Error> {
        let patterns = RedactionPatterns::new()?;
        let line = "INFO image_moderator: Moderation enabled in 3 servers";
        assert_eq!(patterns.redact(line), line);
        Ok(())
    }

    #[test]
    fn test_writer_masks_output() -> Result<(), Box<dyn std::error::Error>> {
        let patterns = Arc::new(RedactionPatterns::new()?);
        let mut writer = RedactingWriter::new(Vec::new(), patterns);
        let line = format!("token {FAKE_TOKEN}\n");
        let written = writer.write(line.as_bytes())?;
        assert_eq!(written, line.len());
        let out = String::from_utf8(writer.inner)?;
        assert_eq!(out, "token [DISCORD_TOKEN]\n");
        Ok(())
    }
}
