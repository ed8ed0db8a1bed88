//! Startup banner.

const BOLD: &str = "\x1b[1m";
const CYAN: &str = "\x1b[36m";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";

/// Banner text for `version`, with ANSI colours.
pub fn render(version: &str) -> String {
    let rule = "─".repeat(44);
    format!(
        "{CYAN}{rule}{RESET}\n\
         {BOLD}{CYAN}  mediabatch{RESET} {DIM}v{version}{RESET}\n\
         {DIM}  batch video/audio encoding with ffmpeg{RESET}\n\
         {CYAN}{rule}{RESET}"
    )
}
