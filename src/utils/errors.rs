//! User-Friendly Error Formatting
//!
//! Provides user-friendly error messages with troubleshooting hints
//! for common launch failures.

use std::fmt::Write;

/// Format error for user consumption
///
/// Takes technical error and produces user-friendly message with
/// troubleshooting steps and context.
pub fn format_user_error(error: &anyhow::Error) -> String {
    let mut output = String::new();

    writeln!(&mut output).ok();
    writeln!(
        &mut output,
        "╔════════════════════════════════════════════════════════════╗"
    )
    .ok();
    writeln!(
        &mut output,
        "║                     ERROR                                  ║"
    )
    .ok();
    writeln!(
        &mut output,
        "╚════════════════════════════════════════════════════════════╝"
    )
    .ok();
    writeln!(&mut output).ok();

    // Match on the whole chain, context lines included.
    let error_msg = format!("{:#}", error);

    if error_msg.contains("not found in path") {
        format_command_error(&mut output);
    } else if error_msg.contains("ConsoleKit") || error_msg.contains("D-Bus") {
        format_tracking_error(&mut output);
    } else if error_msg.contains("User not found") || error_msg.contains("require root") {
        format_permission_error(&mut output);
    } else if error_msg.contains("config file") || error_msg.contains("Invalid configuration") {
        format_config_error(&mut output);
    } else {
        format_generic_error(&mut output, &error.to_string());
    }

    writeln!(&mut output).ok();
    writeln!(
        &mut output,
        "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━"
    )
    .ok();
    writeln!(&mut output, "Technical Details:").ok();
    writeln!(&mut output).ok();
    writeln!(&mut output, "{:#}", error).ok();
    writeln!(&mut output).ok();

    writeln!(
        &mut output,
        "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━"
    )
    .ok();
    writeln!(&mut output, "Need Help?").ok();
    writeln!(
        &mut output,
        "  - Run with --verbose for detailed logs: lamco-session-broker -vvv"
    )
    .ok();
    writeln!(
        &mut output,
        "  - Check the session log file configured in [session] log_file"
    )
    .ok();
    writeln!(
        &mut output,
        "╚════════════════════════════════════════════════════════════╝"
    )
    .ok();

    output
}

fn format_command_error(output: &mut String) {
    writeln!(output, "Session Command Not Found").ok();
    writeln!(output).ok();
    writeln!(output, "The configured session command is not on the search path.").ok();
    writeln!(output).ok();
    writeln!(output, "Common Causes:").ok();
    writeln!(output).ok();
    writeln!(output, "  1. Desktop environment not installed").ok();
    writeln!(output, "     → Check: command -v <session binary>").ok();
    writeln!(output).ok();
    writeln!(output, "  2. Binary lives outside the search path").ok();
    writeln!(output, "     → Use an absolute path in [session] command").ok();
    writeln!(output, "     → Or set [session] search_path").ok();
}

fn format_tracking_error(output: &mut String) {
    writeln!(output, "Session Tracking Error (ConsoleKit)").ok();
    writeln!(output).ok();
    writeln!(output, "Could not register the session with ConsoleKit.").ok();
    writeln!(output).ok();
    writeln!(output, "Common Causes:").ok();
    writeln!(output).ok();
    writeln!(output, "  1. ConsoleKit is not running").ok();
    writeln!(output, "     → Check: ls /run/ConsoleKit").ok();
    writeln!(output, "     → Start the console-kit-daemon service").ok();
    writeln!(output).ok();
    writeln!(output, "  2. System bus unavailable").ok();
    writeln!(output, "     → Check: systemctl status dbus").ok();
    writeln!(output).ok();
    writeln!(output, "  3. Session tracking is optional on this system").ok();
    writeln!(output, "     → Set [registrar] required = false").ok();
    writeln!(output, "     → Or set [registrar] backend = \"none\"").ok();
}

fn format_permission_error(output: &mut String) {
    writeln!(output, "User or Permission Error").ok();
    writeln!(output).ok();
    writeln!(output, "The session user could not be resolved or switched to.").ok();
    writeln!(output).ok();
    writeln!(output, "Common Causes:").ok();
    writeln!(output).ok();
    writeln!(output, "  1. User does not exist").ok();
    writeln!(output, "     → Check: getent passwd <user>").ok();
    writeln!(output).ok();
    writeln!(output, "  2. Daemon not running as root").ok();
    writeln!(output, "     → Only root can launch sessions for other users").ok();
}

fn format_config_error(output: &mut String) {
    writeln!(output, "Configuration Error").ok();
    writeln!(output).ok();
    writeln!(output, "Problem with configuration file.").ok();
    writeln!(output).ok();
    writeln!(output, "Common Causes:").ok();
    writeln!(output).ok();
    writeln!(output, "  1. Configuration file not found").ok();
    writeln!(
        output,
        "     → Default location: /etc/lamco-session-broker/config.toml"
    )
    .ok();
    writeln!(
        output,
        "     → Or specify: lamco-session-broker -c /path/to/config.toml"
    )
    .ok();
    writeln!(output).ok();
    writeln!(output, "  2. Invalid TOML syntax").ok();
    writeln!(output, "     → Check for typos, missing quotes, etc.").ok();
}

fn format_generic_error(output: &mut String, error: &str) {
    writeln!(output, "Session Broker Error").ok();
    writeln!(output).ok();
    writeln!(output, "An error occurred while launching the session.").ok();
    writeln!(output).ok();
    writeln!(output, "Error: {}", error).ok();
}
