//! The publish orchestrator.
//!
//! Sequences one publish run end to end: manifest validation, remote
//! repository preparation, the commit/branch/version workflow, the cloud
//! build, and (for production) release finalization.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use semver::Version;

use crate::cloudbuild::{BuildParams, CloudBuild};
use crate::config::{CachedValue, Config, OwnerMode};
use crate::error::{CliError, Result};
use crate::git::workflow::{self, BranchSynchronizer, ReleaseFinalizer};
use crate::git::GitRepo;
use crate::manifest::Manifest;
use crate::server::{create_git_server, GitServer, SERVER_CHOICES};
use crate::ui;
use crate::version::{self, VersionPlan};

/// Default build command handed to the cloud-build service.
pub const DEFAULT_BUILD_CMD: &str = "npm run build";

/// Default ignore-file body written when the project has none.
pub const GITIGNORE_BODY: &str = "\
.DS_Store
node_modules
/dist

# local env files
.env.local
.env.*.local

# Log files
npm-debug.log*
yarn-debug.log*
yarn-error.log*

# Editor directories and files
.idea
.vscode
*.suo
*.ntvs*
*.njsproj
*.sln
*.sw?
";

/// Command-line options of one publish invocation.
#[derive(Debug, Default, Clone)]
pub struct PublishOptions {
    pub refresh_server: bool,
    pub refresh_token: bool,
    pub refresh_owner: bool,
    pub build_cmd: Option<String>,
    pub prod: bool,
}

/// The project being published. Immutable except for the version, which the
/// version negotiation may bump.
#[derive(Debug, Clone)]
pub struct ProjectRef {
    pub name: String,
    pub version: Version,
    pub dir: PathBuf,
}

/// The resolved remote repository.
#[derive(Debug, Clone)]
pub struct RepositoryRef {
    pub login: String,
    pub url: String,
    pub existed: bool,
}

/// Everything one publish run operates on, owned by the orchestrator.
#[derive(Debug, Clone)]
pub struct PublishContext {
    pub project: ProjectRef,
    pub repo: RepositoryRef,
    pub dev_branch: String,
    pub prod: bool,
}

/// Writes the default ignore file when the project has none.
///
/// # Returns
/// * `Ok(true)` - The file was created
/// * `Ok(false)` - A `.gitignore` already existed and was left untouched
pub fn ensure_gitignore(dir: &Path) -> Result<bool> {
    let path = dir.join(".gitignore");
    if path.exists() {
        return Ok(false);
    }
    fs::write(&path, GITIGNORE_BODY)?;
    Ok(true)
}

pub struct Publisher<'a> {
    config: &'a Config,
    options: PublishOptions,
}

impl<'a> Publisher<'a> {
    pub fn new(config: &'a Config, options: PublishOptions) -> Self {
        Publisher { config, options }
    }

    /// Runs one publish invocation in `dir`.
    pub fn run(&self, dir: &Path) -> Result<()> {
        let started = Instant::now();

        let mut manifest = Manifest::load(dir)?;
        manifest.validate()?;
        let project = ProjectRef {
            name: manifest
                .name()
                .ok_or_else(|| CliError::manifest("missing 'name'"))?
                .to_string(),
            version: manifest
                .version()
                .ok_or_else(|| CliError::manifest("missing 'version'"))?,
            dir: dir.to_path_buf(),
        };

        let server = self.prepare_server()?;
        let (owner, login) = self.check_owner(server.as_ref())?;
        let repo_ref = self.ensure_remote_repo(server.as_ref(), owner, &login, &project.name)?;

        if ensure_gitignore(dir)? {
            ui::display_success("Wrote default .gitignore");
        }

        let mut repo = GitRepo::init_or_open(dir)?;
        repo.ensure_remote(&repo_ref.url)?;

        workflow::check_conflicted(&repo)?;

        // Version negotiation runs before the commit step so a bumped
        // manifest is part of the published commit.
        let (version, dev_branch) = self.negotiate_version(&repo, &mut manifest, &project)?;

        workflow::check_not_committed(&repo, || ui::prompt_nonempty("Commit message"))?;

        let mut synchronizer = BranchSynchronizer::new(&mut repo, server.get_ssh_keys_url());
        synchronizer.sync(&dev_branch)?;

        let context = PublishContext {
            project: ProjectRef {
                version: version.clone(),
                ..project
            },
            repo: repo_ref,
            dev_branch,
            prod: self.options.prod,
        };

        self.trigger_build(&context, manifest.build_script())?;

        if context.prod {
            ReleaseFinalizer::new(&repo).finalize(&version, &context.dev_branch)?;
        }

        ui::display_success(&format!(
            "Publish finished in {}s",
            started.elapsed().as_secs()
        ));
        Ok(())
    }

    /// Resolves the provider: cached choice, or a first-time prompt, then the
    /// access token (prompted with the provider's token URL when absent).
    fn prepare_server(&self) -> Result<Box<dyn GitServer>> {
        let cached = self.config.read_cached(CachedValue::Server)?;
        let name = match cached {
            Some(name) if !self.options.refresh_server => name,
            _ => {
                let labels: Vec<String> = SERVER_CHOICES.iter().map(|s| s.to_string()).collect();
                let index = ui::prompt_select("Choose a git hosting platform", &labels)?;
                let name = SERVER_CHOICES[index].to_string();
                self.config.write_cached(CachedValue::Server, &name)?;
                name
            }
        };
        let mut server = create_git_server(&name)?;

        let token = match self.config.read_cached(CachedValue::Token)? {
            Some(token) if !self.options.refresh_token => token,
            _ => {
                ui::display_warn(&format!(
                    "No {} token on file. Generate one at {}",
                    server.name(),
                    server.get_token_url()
                ));
                let token = ui::prompt_password("Paste the token here")?;
                self.config.write_cached(CachedValue::Token, &token)?;
                token
            }
        };
        server.set_token(&token);
        Ok(server)
    }

    /// Decides personal vs organization ownership and the remote login.
    /// Both are cached; `--refresh-owner` forces the interactive choice.
    fn check_owner(&self, server: &dyn GitServer) -> Result<(OwnerMode, String)> {
        let cached_owner = self
            .config
            .read_cached(CachedValue::Owner)?
            .and_then(|s| OwnerMode::parse(&s));
        let cached_login = self.config.read_cached(CachedValue::Login)?;

        if let (Some(owner), Some(login)) = (cached_owner, cached_login.clone()) {
            if !self.options.refresh_owner {
                return Ok((owner, login));
            }
        }

        let user = server.get_user()?;
        let orgs = server.get_orgs()?;

        let owner = if orgs.is_empty() {
            OwnerMode::User
        } else {
            let labels = vec!["personal".to_string(), "organization".to_string()];
            match ui::prompt_select("Where should the remote repository live?", &labels)? {
                0 => OwnerMode::User,
                _ => OwnerMode::Org,
            }
        };

        let login = match owner {
            OwnerMode::User => user.login,
            OwnerMode::Org => {
                let labels: Vec<String> = orgs.iter().map(|o| o.label().to_string()).collect();
                let index = ui::prompt_select("Choose an organization", &labels)?;
                orgs[index].login.clone()
            }
        };

        self.config.write_cached(CachedValue::Owner, owner.as_str())?;
        self.config.write_cached(CachedValue::Login, &login)?;
        Ok((owner, login))
    }

    /// Looks the repository up, creating it when absent.
    fn ensure_remote_repo(
        &self,
        server: &dyn GitServer,
        owner: OwnerMode,
        login: &str,
        name: &str,
    ) -> Result<RepositoryRef> {
        let existing = server.get_repo(login, name)?;
        let existed = existing.is_some();
        if !existed {
            ui::display_status(&format!("Creating remote repository {}/{}", login, name));
            match owner {
                OwnerMode::User => server.create_repo(name)?,
                OwnerMode::Org => server.create_org_repo(name, login)?,
            };
            ui::display_success("Remote repository created");
        }
        Ok(RepositoryRef {
            login: login.to_string(),
            url: server.get_remote(login, name),
            existed,
        })
    }

    /// Negotiates the publish version against the remote release history and
    /// persists a bump into the manifest.
    fn negotiate_version(
        &self,
        repo: &GitRepo,
        manifest: &mut Manifest,
        project: &ProjectRef,
    ) -> Result<(Version, String)> {
        let remote_refs = repo.list_remote_refs()?;
        match version::resolve(&project.version, &remote_refs) {
            VersionPlan::Keep { branch } => Ok((project.version.clone(), branch)),
            VersionPlan::Bump {
                release_version,
                choices,
            } => {
                ui::display_status(&format!(
                    "Version {} is already released remotely (latest release/{})",
                    project.version, release_version
                ));
                let labels: Vec<String> = choices
                    .iter()
                    .map(|c| format!("{} ({})", c.kind.label(), c.version))
                    .collect();
                let index = ui::prompt_select("Choose a version increment", &labels)?;
                let version = choices[index].version.clone();
                manifest.set_version(&version)?;
                ui::display_success(&format!("Manifest version set to {}", version));
                Ok((version.clone(), version::dev_branch(&version)))
            }
        }
    }

    /// Hands off to the cloud-build service.
    fn trigger_build(&self, context: &PublishContext, build_script: Option<&str>) -> Result<()> {
        let build_cmd = self
            .options
            .build_cmd
            .as_deref()
            .or(build_script)
            .unwrap_or(DEFAULT_BUILD_CMD);
        let version = context.project.version.to_string();
        let params = BuildParams {
            repo: &context.repo.url,
            name: &context.project.name,
            branch: &context.dev_branch,
            version: &version,
            build_cmd,
            prod: context.prod,
        };
        CloudBuild::new(&self.config.build_server, &params)?.run()
    }
}
