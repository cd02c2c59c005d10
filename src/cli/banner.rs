use colored::Colorize;

/// Display the chronosqli banner (for help/main command only)
pub fn display_banner() {
    let banner = r#"
   ____ _                                ____  ___  _     ___
  / ___| |__  _ __ ___  _ __   ___  ___ / __ \| | | (_)   |_ _|
 | |   | '_ \| '__/ _ \| '_ \ / _ \/ __/ / / /| | | | |    | |
 | |___| | | | | | (_) | | | | (_) \__ \ \/ /_| |_| | |___ | |
  \____|_| |_|_|  \___/|_| |_|\___/|___/\____/ \___/|_____|___|
    "#;

    println!("{}", banner.truecolor(255, 140, 0));
    println!(
        "{}",
        "  chronosqli - statistical timing-oracle engine for time-based blind SQLi".bright_yellow()
    );
    println!(
        "{}",
        "  Welch's-t-test probing, binary-search extraction, adaptive delay calibration"
            .bright_black()
    );
    println!();
    println!(
        "{}",
        "  Authorized use only. Ensure you have permission before testing any target.".yellow()
    );
    println!();
}
