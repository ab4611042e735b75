//! The publish state machine: working-tree guard, branch synchronizer, and
//! release finalizer.
//!
//! One publish run resolves the development branch, reconciles it with the
//! remote master and the remote copy of the same branch, pushes it, and (for
//! production publishes) turns it into a `release/<version>` tag merged back
//! to master.

use git2::{ErrorClass, ErrorCode};
use semver::Version;

use crate::error::{CliError, Result};
use crate::git::GitRepo;
use crate::ui;
use crate::version::release_tag;

/// The integration branch releases are merged back into.
pub const MASTER_BRANCH: &str = "master";

/// Fails if the working tree reports any conflicted path. Never auto-resolves.
pub fn check_conflicted(repo: &GitRepo) -> Result<()> {
    let conflicted = repo.conflicted_paths()?;
    if conflicted.is_empty() {
        return Ok(());
    }
    Err(CliError::conflict(format!(
        "working tree has conflicted files: {}",
        conflicted.join(", ")
    )))
}

/// Stages all pending changes and commits them with an operator-supplied
/// message.
///
/// `ask` supplies the commit message; it is expected to re-prompt until the
/// message is non-empty.
pub fn check_not_committed<F>(repo: &GitRepo, mut ask: F) -> Result<()>
where
    F: FnMut() -> Result<String>,
{
    if !repo.stage_changes()? {
        return Ok(());
    }
    let message = loop {
        let message = ask()?;
        if !message.trim().is_empty() {
            break message;
        }
    };
    repo.commit(message.trim())?;
    ui::display_success("Local changes committed");
    Ok(())
}

/// How a failed pull is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullFailure {
    /// SSH key missing or rejected; fatal with a key-setup link.
    Auth,
    /// The remote does not have the ref; logged and skipped.
    MissingRef,
    /// Anything else; fatal, and the process exits non-zero.
    Other,
}

/// Classifies a fetch/pull error into the workflow's failure policy.
pub fn classify_pull_error(err: &git2::Error) -> PullFailure {
    let message = err.message().to_lowercase();
    if err.class() == ErrorClass::Ssh
        || err.code() == ErrorCode::Auth
        || message.contains("permission denied")
        || message.contains("authentication")
        || message.contains("publickey")
    {
        return PullFailure::Auth;
    }
    if err.code() == ErrorCode::NotFound
        || message.contains("couldn't find remote ref")
        || message.contains("not found")
    {
        return PullFailure::MissingRef;
    }
    PullFailure::Other
}

/// Creates/switches the development branch and reconciles it with the remote.
pub struct BranchSynchronizer<'a> {
    repo: &'a mut GitRepo,
    /// Key-setup URL of the active hosting provider, used in auth errors.
    ssh_keys_url: &'a str,
}

impl<'a> BranchSynchronizer<'a> {
    pub fn new(repo: &'a mut GitRepo, ssh_keys_url: &'a str) -> Self {
        BranchSynchronizer { repo, ssh_keys_url }
    }

    /// Runs the per-publish branch sequence:
    /// stash pop → conflict check → checkout dev branch → pull master →
    /// pull remote dev branch → push dev branch.
    pub fn sync(&mut self, dev_branch: &str) -> Result<()> {
        if self.repo.stash_pop_if_any()? {
            ui::display_status("Popped stash entry");
        }
        // A popped stash may reintroduce conflicts.
        check_conflicted(self.repo)?;

        ui::display_status(&format!("Switching to branch {}", dev_branch));
        self.repo.checkout_branch(dev_branch)?;

        self.pull(MASTER_BRANCH)?;
        self.pull(dev_branch)?;

        ui::display_status(&format!("Pushing {} to origin", dev_branch));
        self.repo
            .push_branch(dev_branch)
            .map_err(|e| self.map_push_error(e))?;
        ui::display_success(&format!("Pushed {} to origin", dev_branch));
        Ok(())
    }

    /// Pulls one remote branch into the current branch, applying the
    /// classification policy for failures.
    fn pull(&self, branch: &str) -> Result<()> {
        match self.repo.fetch_branch(branch) {
            Ok(()) => {
                if self.repo.remote_tracking_exists(branch) {
                    ui::display_status(&format!("Merging origin/{} into current branch", branch));
                    self.repo.merge_remote_branch(branch)?;
                }
                Ok(())
            }
            Err(e) => match classify_pull_error(&e) {
                PullFailure::MissingRef => {
                    ui::display_status(&format!(
                        "Remote has no branch {}; skipping pull",
                        branch
                    ));
                    Ok(())
                }
                PullFailure::Auth => Err(CliError::remote_auth(
                    format!("pull of {} failed: {}", branch, e.message()),
                    self.ssh_keys_url,
                )),
                PullFailure::Other => Err(e.into()),
            },
        }
    }

    fn map_push_error(&self, err: git2::Error) -> CliError {
        match classify_pull_error(&err) {
            PullFailure::Auth => CliError::remote_auth(
                format!("push failed: {}", err.message()),
                self.ssh_keys_url,
            ),
            _ => err.into(),
        }
    }
}

/// Turns a finished development branch into a release: tag, merge to master,
/// push, and delete the development branch.
pub struct ReleaseFinalizer<'a> {
    repo: &'a GitRepo,
}

impl<'a> ReleaseFinalizer<'a> {
    pub fn new(repo: &'a GitRepo) -> Self {
        ReleaseFinalizer { repo }
    }

    /// Full production sequence. Merge conflicts are fatal and left for
    /// manual resolution.
    pub fn finalize(&self, version: &Version, dev_branch: &str) -> Result<()> {
        self.check_tag(version)?;

        ui::display_status(&format!("Switching to {}", MASTER_BRANCH));
        self.repo.checkout_branch(MASTER_BRANCH)?;

        ui::display_status(&format!("Merging {} into {}", dev_branch, MASTER_BRANCH));
        self.repo.merge_local_branch(dev_branch)?;

        self.repo.push_branch(MASTER_BRANCH)?;
        ui::display_success(&format!("Pushed {} to origin", MASTER_BRANCH));

        self.delete_dev_branch(dev_branch);
        Ok(())
    }

    /// Deletes any stale `release/<version>` tag remotely and locally, then
    /// creates and pushes a fresh one. Re-publishing the same version is
    /// idempotent and needs no manual tag cleanup.
    pub fn check_tag(&self, version: &Version) -> Result<()> {
        let tag = release_tag(version);

        let remote_refs = self.repo.list_remote_refs()?;
        if remote_refs.contains(&format!("refs/tags/{}", tag)) {
            ui::display_status(&format!("Deleting stale remote tag {}", tag));
            self.repo.delete_remote_tag(&tag)?;
        }
        if self.repo.local_tag_exists(&tag) {
            ui::display_status(&format!("Deleting stale local tag {}", tag));
            self.repo.delete_local_tag(&tag)?;
        }

        self.repo.create_tag(&tag)?;
        self.repo.push_tag(&tag)?;
        ui::display_success(&format!("Pushed tag {}", tag));
        Ok(())
    }

    fn delete_dev_branch(&self, dev_branch: &str) {
        // The branch is fully merged at this point; deletion failures are
        // reported but do not fail the release.
        if let Err(e) = self.repo.delete_local_branch(dev_branch) {
            ui::display_warn(&format!("could not delete local {}: {}", dev_branch, e));
        }
        if let Err(e) = self.repo.delete_remote_branch(dev_branch) {
            ui::display_warn(&format!("could not delete remote {}: {}", dev_branch, e));
        } else {
            ui::display_success(&format!("Deleted development branch {}", dev_branch));
        }
    }
}
