//! The `init` command: scaffold a new project from a remote template.
//!
//! Fetches the template catalogue over HTTP, collects project name, version,
//! and template choice, downloads the template package into the local cache,
//! copies its payload into the target directory, and runs the template's
//! install and start commands.

use std::fs;
use std::path::Path;
use std::process::Command;

use semver::Version;
use serde::Deserialize;
use walkdir::WalkDir;

use crate::config::Config;
use crate::error::{CliError, Result};
use crate::package::TemplatePackage;
use crate::ui;

/// Commands a template is allowed to run on the user's machine.
const COMMAND_ALLOW_LIST: [&str; 3] = ["npm", "cnpm", "yarn"];

/// One entry of the template catalogue.
#[derive(Debug, Clone, Deserialize)]
pub struct TemplateInfo {
    pub name: String,
    #[serde(rename = "npmName")]
    pub npm_name: String,
    pub version: String,
    #[serde(rename = "installCommand", default)]
    pub install_command: Option<String>,
    #[serde(rename = "startCommand", default)]
    pub start_command: Option<String>,
}

#[derive(Debug, Default)]
pub struct InitOptions {
    /// Skip the non-empty-directory confirmation.
    pub force: bool,
}

/// Collected answers for one init run.
struct ProjectInfo {
    name: String,
    version: Version,
    template_index: usize,
}

/// Runs the init command in the current working directory.
pub fn run(config: &Config, project_name: Option<String>, options: &InitOptions) -> Result<()> {
    let templates = fetch_templates(config)?;
    let target = std::env::current_dir()?;

    if !ensure_empty_dir(&target, options.force)? {
        ui::display_status("Init cancelled");
        return Ok(());
    }

    let info = collect_project_info(project_name, &templates)?;
    let template = &templates[info.template_index];
    ui::display_verbose(
        config.verbose,
        &format!("project {} v{}", info.name, info.version),
    );

    let mut package = TemplatePackage::new(
        config.template_cache_dir(),
        &template.npm_name,
        &template.version,
    );
    if package.is_installed() {
        ui::display_status("Updating cached template...");
        package.update()?;
    } else {
        ui::display_status("Downloading template...");
        package.install()?;
    }
    ui::display_success(&format!(
        "Template {} v{} ready",
        template.npm_name,
        package.version()
    ));

    copy_dir(&package.template_dir(), &target)?;
    ui::display_success("Template installed");

    if let Some(cmd) = template.install_command.as_deref() {
        ui::display_status("Installing dependencies...");
        run_template_command(cmd, &target, "dependency install")?;
    }
    if let Some(cmd) = template.start_command.as_deref() {
        ui::display_status("Starting project...");
        run_template_command(cmd, &target, "project start")?;
    }

    Ok(())
}

/// Fetches the template catalogue from the configured template server.
fn fetch_templates(config: &Config) -> Result<Vec<TemplateInfo>> {
    let url = format!("{}/project/getTemplate", config.template_server);
    let response = reqwest::blocking::get(&url)?;
    if !response.status().is_success() {
        return Err(CliError::remote_state(format!(
            "template list request failed: {}",
            response.status()
        )));
    }
    let templates: Vec<TemplateInfo> = response.json()?;
    if templates.is_empty() {
        return Err(CliError::remote_state("no project templates available"));
    }
    Ok(templates)
}

/// Whether the directory is empty, ignoring dotfiles and `node_modules`.
pub fn dir_is_empty(dir: &Path) -> Result<bool> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with('.') || name == "node_modules" {
            continue;
        }
        return Ok(false);
    }
    Ok(true)
}

/// Confirms (unless forced) and clears a non-empty target directory.
///
/// # Returns
/// * `Ok(true)` - The directory is ready for scaffolding
/// * `Ok(false)` - The operator declined
fn ensure_empty_dir(dir: &Path, force: bool) -> Result<bool> {
    if dir_is_empty(dir)? {
        return Ok(true);
    }

    if !force && !ui::confirm("Directory is not empty. Continue creating the project?", false)? {
        return Ok(false);
    }
    if !ui::confirm(
        "Continuing will delete everything in this directory. Are you sure?",
        false,
    )? {
        return Ok(false);
    }

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            fs::remove_dir_all(&path)?;
        } else {
            fs::remove_file(&path)?;
        }
    }
    Ok(true)
}

/// Prompts for project name, version, and template choice. Invalid input
/// re-prompts rather than failing.
fn collect_project_info(
    project_name: Option<String>,
    templates: &[TemplateInfo],
) -> Result<ProjectInfo> {
    let name = match project_name {
        Some(name) if ui::valid_project_name(&name) => name,
        given => {
            if given.is_some() {
                ui::display_warn("the given project name is not valid");
            }
            ui::prompt_input("Project name", None, |input| {
                if ui::valid_project_name(input) {
                    Ok(input.to_string())
                } else {
                    Err("project name must start with a letter and use only letters, digits, '-' or '_'".to_string())
                }
            })?
        }
    };

    let version = ui::prompt_input("Project version", Some("1.0.0"), |input| {
        Version::parse(input).map_err(|_| "enter a valid semantic version".to_string())
    })?;

    let labels: Vec<String> = templates.iter().map(|t| t.name.clone()).collect();
    let template_index = ui::prompt_select("Choose a project template", &labels)?;

    Ok(ProjectInfo {
        name,
        version,
        template_index,
    })
}

/// Recursively copies the template payload into the target directory.
pub fn copy_dir(src: &Path, dst: &Path) -> Result<()> {
    if !src.is_dir() {
        return Err(CliError::remote_state(format!(
            "template payload missing at {}",
            src.display()
        )));
    }
    for entry in WalkDir::new(src) {
        let entry = entry.map_err(|e| {
            CliError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
        })?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .expect("walkdir yields paths under its root");
        if rel.as_os_str().is_empty() {
            continue;
        }
        let target = dst.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Splits a template command and rejects anything outside the allow-list.
fn check_command(command: &str) -> Result<(String, Vec<String>)> {
    let mut parts = command.split_whitespace();
    let cmd = parts
        .next()
        .ok_or_else(|| CliError::user_input("empty template command"))?;
    if !COMMAND_ALLOW_LIST.contains(&cmd) {
        return Err(CliError::user_input(format!(
            "'{}' is not an allowed template command (allowed: {})",
            command,
            COMMAND_ALLOW_LIST.join(", ")
        )));
    }
    Ok((cmd.to_string(), parts.map(str::to_string).collect()))
}

fn run_template_command(command: &str, dir: &Path, what: &str) -> Result<()> {
    let (cmd, args) = check_command(command)?;
    let status = Command::new(cmd).args(args).current_dir(dir).status()?;
    if !status.success() {
        return Err(CliError::remote_state(format!("{} failed", what)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_check_command_allow_list() {
        assert!(check_command("npm install").is_ok());
        assert!(check_command("yarn").is_ok());
        assert!(check_command("cnpm install --registry=x").is_ok());
        assert!(check_command("rm -rf /").is_err());
        assert!(check_command("").is_err());
    }

    #[test]
    fn test_check_command_splits_args() {
        let (cmd, args) = check_command("npm run serve").unwrap();
        assert_eq!(cmd, "npm");
        assert_eq!(args, vec!["run".to_string(), "serve".to_string()]);
    }

    #[test]
    fn test_dir_is_empty_ignores_hidden_and_node_modules() {
        let dir = TempDir::new().unwrap();
        assert!(dir_is_empty(dir.path()).unwrap());

        fs::create_dir(dir.path().join(".git")).unwrap();
        fs::create_dir(dir.path().join("node_modules")).unwrap();
        assert!(dir_is_empty(dir.path()).unwrap());

        fs::write(dir.path().join("index.js"), "x").unwrap();
        assert!(!dir_is_empty(dir.path()).unwrap());
    }

    #[test]
    fn test_copy_dir_recreates_tree() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();

        fs::create_dir_all(src.path().join("src/components")).unwrap();
        fs::write(src.path().join("package.json"), "{}").unwrap();
        fs::write(src.path().join("src/components/App.vue"), "<template/>").unwrap();

        copy_dir(src.path(), dst.path()).unwrap();

        assert!(dst.path().join("package.json").exists());
        assert!(dst.path().join("src/components/App.vue").exists());
    }

    #[test]
    fn test_copy_dir_missing_source() {
        let dst = TempDir::new().unwrap();
        assert!(copy_dir(Path::new("/nonexistent/template"), dst.path()).is_err());
    }

    #[test]
    fn test_template_info_deserializes_camel_case() {
        let json = r#"{
            "name": "Vue3 standard template",
            "npmName": "cms-template-vue3",
            "version": "1.0.2",
            "installCommand": "npm install",
            "startCommand": "npm run serve"
        }"#;
        let info: TemplateInfo = serde_json::from_str(json).unwrap();
        assert_eq!(info.npm_name, "cms-template-vue3");
        assert_eq!(info.install_command.as_deref(), Some("npm install"));
    }
}
