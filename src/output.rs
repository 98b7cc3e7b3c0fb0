//! # Console Output
//!
//! Progress of a provisioning run is reported as coloured, iconified lines.
//! [`OutputConfig`] decides whether colours and emoji are used; [`Printer`]
//! writes the lines.
//!
//! ## Respecting User Preferences
//!
//! - `--color=never|always|auto` - CLI flag for color control
//! - `NO_COLOR` - Disables colors when set (per https://no-color.org/)
//! - `CLICOLOR=0` - Disables colors
//! - `CLICOLOR_FORCE=1` - Forces colors even in non-TTY
//! - `TERM=dumb` - Disables colors for dumb terminals
//!
//! ## Inline status
//!
//! Most steps print a description without a newline and then finish the line
//! with a status marker:
//!
//! ```rust
//! use fabric_provisioner::output::Printer;
//!
//! let out = Printer::capture();
//! out.info_inline("Creating workspace 'Sales - Store [dev]'...");
//! out.success("");
//! out.info_inline("Creating workspace 'Sales - Model [dev]'...");
//! out.warning("Already exists");
//! assert_eq!(
//!     out.captured(),
//!     "Creating workspace 'Sales - Store [dev]'... [OK]\n\
//!      Creating workspace 'Sales - Model [dev]'... [WARN] Already exists\n"
//! );
//! ```

use console::{style, Term};
use indicatif::{ProgressBar, ProgressStyle};
use std::cell::{Cell, RefCell};
use std::env;
use std::io::Write;

/// Output configuration for controlling colors and emojis.
#[derive(Debug, Clone)]
pub struct OutputConfig {
    /// Whether colors and emojis should be used in output.
    pub use_color: bool,
}

impl OutputConfig {
    /// Create an output configuration from environment and CLI flag.
    ///
    /// `always` forces colours on (overriding `NO_COLOR`), `never` forces
    /// them off and anything else detects terminal support.
    pub fn from_env_and_flag(color_flag: &str) -> Self {
        let use_color = match color_flag.to_lowercase().as_str() {
            "always" => true,
            "never" => false,
            _ => Self::detect_color_support(),
        };

        Self { use_color }
    }

    fn detect_color_support() -> bool {
        // The presence of the variable (even if empty) disables colors
        if env::var_os("NO_COLOR").is_some() {
            return false;
        }

        if env::var("CLICOLOR").is_ok_and(|v| v == "0") {
            return false;
        }

        if env::var("CLICOLOR_FORCE").is_ok_and(|v| v != "0" && !v.is_empty()) {
            return true;
        }

        if env::var("TERM").is_ok_and(|v| v == "dumb") {
            return false;
        }

        console::Term::stdout().features().colors_supported()
    }

    pub fn with_color() -> Self {
        Self { use_color: true }
    }

    pub fn without_color() -> Self {
        Self { use_color: false }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self::from_env_and_flag("auto")
    }
}

/// Returns the emoji when colors are enabled, the plain text otherwise.
pub fn emoji<'a>(config: &OutputConfig, emoji_str: &'a str, plain: &'a str) -> &'a str {
    if config.use_color {
        emoji_str
    } else {
        plain
    }
}

enum Sink {
    Stdout,
    Capture(RefCell<String>),
}

/// Writes progress lines for a run.
pub struct Printer {
    config: OutputConfig,
    sink: Sink,
    inline_open: Cell<bool>,
}

impl Printer {
    pub fn new(config: OutputConfig) -> Self {
        Self {
            config,
            sink: Sink::Stdout,
            inline_open: Cell::new(false),
        }
    }

    /// A printer that keeps plain-text output in memory.
    pub fn capture() -> Self {
        Self {
            config: OutputConfig::without_color(),
            sink: Sink::Capture(RefCell::new(String::new())),
            inline_open: Cell::new(false),
        }
    }

    /// Everything written so far by a capturing printer.
    pub fn captured(&self) -> String {
        match &self.sink {
            Sink::Capture(buffer) => buffer.borrow().clone(),
            Sink::Stdout => String::new(),
        }
    }

    pub fn config(&self) -> &OutputConfig {
        &self.config
    }

    fn write(&self, text: &str) {
        match &self.sink {
            Sink::Stdout => {
                let mut stdout = std::io::stdout();
                let _ = stdout.write_all(text.as_bytes());
                let _ = stdout.flush();
            }
            Sink::Capture(buffer) => buffer.borrow_mut().push_str(text),
        }
    }

    fn close_inline(&self) {
        if self.inline_open.replace(false) {
            self.write("\n");
        }
    }

    /// Section title, preceded by a blank line.
    pub fn header(&self, text: &str) {
        self.close_inline();
        let rule = "=".repeat(text.chars().count());
        let styled = style(format!("{}\n{}", text, rule))
            .cyan()
            .bold()
            .force_styling(self.config.use_color);
        self.write(&format!("\n{}\n", styled));
    }

    pub fn subheader(&self, text: &str) {
        self.close_inline();
        let styled = style(text).bold().force_styling(self.config.use_color);
        self.write(&format!("\n{}\n", styled));
    }

    pub fn info(&self, text: &str) {
        self.close_inline();
        self.write(&format!("{}\n", text));
    }

    /// Start a line that a status call will finish.
    pub fn info_inline(&self, text: &str) {
        self.close_inline();
        let styled = style(text).bold().force_styling(self.config.use_color);
        self.write(&styled.to_string());
        self.inline_open.set(true);
    }

    /// A bullet line below the current step, optionally inline.
    pub fn detail(&self, text: &str) {
        self.close_inline();
        self.write(&format!("  {} {}", emoji(&self.config, "•", "-"), text));
        self.inline_open.set(true);
    }

    /// Progress marker while waiting on an inline step.
    pub fn tick(&self) {
        self.write(".");
    }

    fn status(&self, icon: &str, plain: &str, text: &str, paint: fn(console::StyledObject<String>) -> console::StyledObject<String>) {
        let marker = emoji(&self.config, icon, plain);
        let message = if text.is_empty() {
            marker.to_string()
        } else {
            format!("{} {}", marker, text)
        };
        let styled = paint(style(message)).force_styling(self.config.use_color);
        if self.inline_open.replace(false) {
            self.write(&format!(" {}\n", styled));
        } else {
            self.write(&format!("{}\n", styled));
        }
    }

    pub fn success(&self, text: &str) {
        self.status("✔", "[OK]", text, |s| s.green());
    }

    pub fn warning(&self, text: &str) {
        self.status("⚠", "[WARN]", text, |s| s.yellow());
    }

    pub fn error(&self, text: &str) {
        self.status("✖", "[ERR]", text, |s| s.red());
    }

    /// Terminate any open inline line.
    pub fn finish(&self) {
        self.close_inline();
    }

    /// A progress bar over `len` steps, drawn only on an interactive stdout.
    pub fn progress(&self, len: u64) -> ProgressBar {
        self.close_inline();
        let bar = match self.sink {
            Sink::Stdout if Term::stdout().is_term() => ProgressBar::new(len),
            _ => ProgressBar::hidden(),
        };
        bar.set_length(len);
        if let Ok(template) = ProgressStyle::with_template("  {spinner:.cyan} [{bar:30.cyan/blue}] {pos}/{len} {msg}") {
            bar.set_style(template.progress_chars("=> "));
        }
        bar
    }
}

impl Default for Printer {
    fn default() -> Self {
        Self::new(OutputConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_color_always() {
        let config = OutputConfig::from_env_and_flag("always");
        assert!(config.use_color);
    }

    #[test]
    fn test_color_never() {
        let config = OutputConfig::from_env_and_flag("never");
        assert!(!config.use_color);
    }

    #[test]
    #[serial]
    fn test_no_color_env_disables_auto() {
        env::set_var("NO_COLOR", "1");
        let config = OutputConfig::from_env_and_flag("auto");
        env::remove_var("NO_COLOR");
        assert!(!config.use_color);
    }

    #[test]
    fn test_emoji_helper() {
        assert_eq!(emoji(&OutputConfig::with_color(), "✔", "[OK]"), "✔");
        assert_eq!(emoji(&OutputConfig::without_color(), "✔", "[OK]"), "[OK]");
    }

    #[test]
    fn test_header_and_statuses() {
        let out = Printer::capture();
        out.header("Setting up dev environment");
        out.info_inline("Creating workspace 'A'...");
        out.success("");
        out.detail("Assigning workspace permission for identity g1...");
        out.success("");
        out.warning("No environment definition found");
        assert_eq!(
            out.captured(),
            "\nSetting up dev environment\n\
             ==========================\n\
             Creating workspace 'A'... [OK]\n  \
             - Assigning workspace permission for identity g1... [OK]\n\
             [WARN] No environment definition found\n"
        );
    }

    #[test]
    fn test_info_closes_open_inline() {
        let out = Printer::capture();
        out.info_inline("Waiting");
        out.tick();
        out.tick();
        out.info("next");
        out.error("Failed!");
        assert_eq!(out.captured(), "Waiting..\nnext\n[ERR] Failed!\n");
    }
}
