//! Terminal output and interactive prompts.
//!
//! Prompts are explicit input-validation loops: a validator turns the raw
//! line into a typed value or a re-prompt reason, and the loop repeats until
//! a value is accepted. Display helpers use `console` for styling.

use std::io::{self, Write};

use console::{style, Term};

use crate::error::Result;

pub fn display_success(message: &str) {
    println!("{} {}", style("✓").green(), message);
}

pub fn display_error(message: &str) {
    eprintln!("{} {}", style("ERROR:").red().bold(), message);
}

pub fn display_status(message: &str) {
    println!("{} {}", style("→").yellow(), message);
}

pub fn display_warn(message: &str) {
    eprintln!("{} {}", style("⚠ WARNING:").yellow(), message);
}

/// Extra progress detail, shown only in verbose mode.
pub fn display_verbose(verbose: bool, message: &str) {
    if verbose {
        println!("{} {}", style("·").dim(), message);
    }
}

/// Outcome of validating one line of user input.
///
/// `Err` carries the re-prompt reason shown to the operator.
pub type Validation<T> = std::result::Result<T, String>;

/// Prompts until the validator accepts the input.
///
/// An empty line selects `default` when one is given (the default is shown in
/// brackets and still passes through the validator).
///
/// # Arguments
/// * `message` - The prompt message, without trailing punctuation
/// * `default` - Optional value used when the operator presses Enter
/// * `validate` - Maps the raw input to a typed value or a re-prompt reason
pub fn prompt_input<T, F>(message: &str, default: Option<&str>, validate: F) -> Result<T>
where
    F: Fn(&str) -> Validation<T>,
{
    loop {
        match default {
            Some(d) => print!("{} [{}]: ", message, style(d).dim()),
            None => print!("{}: ", message),
        }
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        let mut input = input.trim();
        if input.is_empty() {
            if let Some(d) = default {
                input = d;
            }
        }

        match validate(input) {
            Ok(value) => return Ok(value),
            Err(reason) => display_error(&reason),
        }
    }
}

/// Prompts for a non-empty line, retrying until one is entered.
pub fn prompt_nonempty(message: &str) -> Result<String> {
    prompt_input(message, None, |input| {
        if input.is_empty() {
            Err("input must not be empty".to_string())
        } else {
            Ok(input.to_string())
        }
    })
}

/// Prompts for a secret without echoing it to the terminal.
pub fn prompt_password(message: &str) -> Result<String> {
    let term = Term::stdout();
    loop {
        print!("{}: ", message);
        io::stdout().flush()?;
        let input = term.read_secure_line()?;
        let input = input.trim();
        if input.is_empty() {
            display_error("input must not be empty");
            continue;
        }
        return Ok(input.to_string());
    }
}

/// Prompts the operator to pick one item from a numbered list.
///
/// A single-item list is selected directly without prompting; Enter picks
/// the first item.
///
/// # Returns
/// The zero-based index of the chosen item.
pub fn prompt_select(message: &str, labels: &[String]) -> Result<usize> {
    if labels.len() == 1 {
        return Ok(0);
    }

    println!("\n{}", style(message).bold());
    for (i, label) in labels.iter().enumerate() {
        println!("  {}. {}", i + 1, label);
    }

    prompt_input(
        &format!("Select (1-{})", labels.len()),
        Some("1"),
        |input| match input.parse::<usize>() {
            Ok(n) if n >= 1 && n <= labels.len() => Ok(n - 1),
            _ => Err(format!("enter a number between 1 and {}", labels.len())),
        },
    )
}

/// Yes/no confirmation. Default is "no" unless `default_yes` is set.
pub fn confirm(prompt: &str, default_yes: bool) -> Result<bool> {
    let suffix = if default_yes { "(Y/n)" } else { "(y/N)" };
    print!("\n{} {}: ", prompt, suffix);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let response = input.trim().to_lowercase();

    if response.is_empty() {
        return Ok(default_yes);
    }
    Ok(response == "y" || response == "yes")
}

/// Validates a project name: letters first, then letters/digits with `-` or
/// `_` separators, each separator followed by a letter.
pub fn valid_project_name(name: &str) -> bool {
    // Same shape the scaffolded templates expect for package names.
    let pattern =
        regex::Regex::new(r"^[a-zA-Z]+([-][a-zA-Z][a-zA-Z0-9]*|[_][a-zA-Z][a-zA-Z0-9]*|[a-zA-Z0-9])*$")
            .expect("project name pattern is valid");
    pattern.is_match(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_project_names() {
        assert!(valid_project_name("demo"));
        assert!(valid_project_name("demo-app"));
        assert!(valid_project_name("demo_app2"));
        assert!(valid_project_name("Demo123"));
    }

    #[test]
    fn test_invalid_project_names() {
        assert!(!valid_project_name(""));
        assert!(!valid_project_name("1demo"));
        assert!(!valid_project_name("demo-"));
        assert!(!valid_project_name("demo--app"));
        assert!(!valid_project_name("-demo"));
        assert!(!valid_project_name("demo app"));
    }

    #[test]
    fn test_display_helpers_do_not_panic() {
        display_success("ok");
        display_status("working");
        display_warn("careful");
        display_verbose(true, "detail");
        display_verbose(false, "hidden");
    }
}
