use rivescript::ReplyMetrics;

mod ansi {
    pub const RESET: &str = "\x1b[0m";
    pub const DIM: &str = "\x1b[2m";
    pub const BOLD: &str = "\x1b[1m";

    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const CYAN: &str = "\x1b[36m";
    pub const GRAY: &str = "\x1b[90m";

    pub fn paint(s: impl AsRef<str>, color: &str) -> String {
        format!("{}{}{}", color, s.as_ref(), RESET)
    }

    pub fn bold(s: impl AsRef<str>) -> String {
        format!("{}{}{}", BOLD, s.as_ref(), RESET)
    }

    pub fn dim(s: impl AsRef<str>) -> String {
        format!("{}{}{}", DIM, s.as_ref(), RESET)
    }
}

/// Prints one REPL turn's matched trigger and timing when `--debug` is set.
pub fn print_turn(message: &str, reply: &str, metrics: &ReplyMetrics) {
    println!("{}", ansi::dim(format!("  in:  {message}")));
    println!("{}", ansi::bold(format!("  out: {reply}")));

    let matched = if metrics.matched_pattern.is_empty() { ansi::dim("<none>".to_string()) } else { ansi::paint(&metrics.matched_pattern, ansi::GREEN) };

    println!(
        "  {} {}  {} {}  {} {}",
        ansi::dim("trigger:"),
        matched,
        ansi::dim("redirects:"),
        ansi::paint(metrics.redirects_followed.to_string(), ansi::YELLOW),
        ansi::dim("took:"),
        ansi::paint(format!("{:?}", metrics.duration), ansi::CYAN),
    );
    println!("{}", ansi::paint("───", ansi::GRAY));
}
