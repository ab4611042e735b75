// End-to-end exercises of the publish state machine against scratch
// repositories with a local bare remote standing in for origin.

use std::fs;
use std::path::Path;

use git2::Repository;
use semver::Version;
use tempfile::TempDir;

use cms_cli::git::workflow::{
    check_conflicted, check_not_committed, BranchSynchronizer, ReleaseFinalizer,
};
use cms_cli::git::GitRepo;
use cms_cli::manifest::Manifest;
use cms_cli::version::{self, VersionPlan};

/// Creates a working repository with one commit on master.
fn init_work_repo() -> (TempDir, GitRepo) {
    let dir = TempDir::new().unwrap();
    let raw = Repository::init(dir.path()).unwrap();
    {
        let mut config = raw.config().unwrap();
        config.set_str("user.name", "Test User").unwrap();
        config.set_str("user.email", "test@example.com").unwrap();
    }
    // Pin the default branch regardless of the host's git configuration.
    raw.reference_symbolic("HEAD", "refs/heads/master", true, "pin master")
        .unwrap();
    drop(raw);

    let repo = GitRepo::init_or_open(dir.path()).unwrap();
    commit_file(&repo, dir.path(), "README.md", "Initial\n", "chore: initial commit");
    (dir, repo)
}

/// Adds a bare repository as origin.
fn add_bare_origin(repo: &GitRepo) -> TempDir {
    let remote_dir = TempDir::new().unwrap();
    Repository::init_bare(remote_dir.path()).unwrap();
    repo.ensure_remote(remote_dir.path().to_str().unwrap())
        .unwrap();
    remote_dir
}

fn commit_file(repo: &GitRepo, dir: &Path, file: &str, content: &str, message: &str) {
    fs::write(dir.join(file), content).unwrap();
    assert!(repo.stage_changes().unwrap());
    repo.commit(message).unwrap();
}

#[test]
fn clean_tree_passes_conflict_check() {
    let (_dir, repo) = init_work_repo();
    assert!(check_conflicted(&repo).is_ok());
}

#[test]
fn check_not_committed_commits_pending_changes() {
    let (dir, repo) = init_work_repo();
    fs::write(dir.path().join("src.js"), "console.log(1);\n").unwrap();

    check_not_committed(&repo, || Ok("feat: add src".to_string())).unwrap();

    // Nothing left to stage afterwards.
    assert!(!repo.stage_changes().unwrap());
}

#[test]
fn check_not_committed_is_a_noop_on_clean_tree() {
    let (_dir, repo) = init_work_repo();
    let mut asked = false;
    check_not_committed(&repo, || {
        asked = true;
        Ok("unused".to_string())
    })
    .unwrap();
    assert!(!asked, "clean tree must not prompt for a commit message");
}

#[test]
fn checkout_creates_missing_dev_branch() {
    let (_dir, repo) = init_work_repo();
    assert!(!repo.local_branch_exists("dev/1.0.0"));

    repo.checkout_branch("dev/1.0.0").unwrap();

    assert!(repo.local_branch_exists("dev/1.0.0"));
    assert_eq!(repo.current_branch().unwrap(), "dev/1.0.0");
}

#[test]
fn merge_conflict_is_fatal_and_surfaced() {
    let (dir, repo) = init_work_repo();

    repo.checkout_branch("dev/1.1.0").unwrap();
    commit_file(&repo, dir.path(), "README.md", "dev change\n", "feat: dev edit");

    repo.checkout_branch("master").unwrap();
    commit_file(&repo, dir.path(), "README.md", "master change\n", "fix: master edit");

    let err = repo.merge_local_branch("dev/1.1.0").unwrap_err();
    assert!(err.to_string().contains("Conflict"));

    // The conflicted tree is then caught by the working-tree guard.
    assert!(check_conflicted(&repo).is_err());
}

#[test]
fn synchronizer_pushes_dev_branch_to_origin() {
    let (_dir, mut repo) = init_work_repo();
    let _origin = add_bare_origin(&repo);
    repo.push_branch("master").unwrap();

    let mut synchronizer = BranchSynchronizer::new(&mut repo, "https://example.com/keys");
    synchronizer.sync("dev/1.0.0").unwrap();

    let refs = repo.list_remote_refs().unwrap();
    assert!(refs.contains(&"refs/heads/dev/1.0.0".to_string()));
}

#[test]
fn synchronizer_tolerates_missing_remote_refs() {
    // Origin has no master at all; both pulls must be skipped, not fatal.
    let (_dir, mut repo) = init_work_repo();
    let _origin = add_bare_origin(&repo);

    let mut synchronizer = BranchSynchronizer::new(&mut repo, "https://example.com/keys");
    synchronizer.sync("dev/2.0.0").unwrap();

    let refs = repo.list_remote_refs().unwrap();
    assert!(refs.contains(&"refs/heads/dev/2.0.0".to_string()));
}

#[test]
fn version_negotiation_against_pushed_release_tags() {
    let (_dir, repo) = init_work_repo();
    let _origin = add_bare_origin(&repo);
    repo.push_branch("master").unwrap();

    repo.create_tag("release/1.2.0").unwrap();
    repo.push_tag("release/1.2.0").unwrap();

    let refs = repo.list_remote_refs().unwrap();
    let local = Version::new(1, 0, 0);
    match version::resolve(&local, &refs) {
        VersionPlan::Bump {
            release_version,
            choices,
        } => {
            assert_eq!(release_version, Version::new(1, 2, 0));
            let versions: Vec<String> =
                choices.iter().map(|c| c.version.to_string()).collect();
            assert_eq!(versions, vec!["1.2.1", "1.3.0", "2.0.0"]);
        }
        other => panic!("expected bump plan, got {:?}", other),
    }
}

#[test]
fn version_negotiation_with_no_release_tags_keeps_local() {
    let (_dir, repo) = init_work_repo();
    let _origin = add_bare_origin(&repo);
    repo.push_branch("master").unwrap();

    let refs = repo.list_remote_refs().unwrap();
    assert_eq!(
        version::resolve(&Version::new(1, 0, 0), &refs),
        VersionPlan::Keep {
            branch: "dev/1.0.0".to_string()
        }
    );
}

#[test]
fn finalizer_tags_merges_and_cleans_up() {
    let (dir, repo) = init_work_repo();
    let _origin = add_bare_origin(&repo);
    repo.push_branch("master").unwrap();

    repo.checkout_branch("dev/1.3.0").unwrap();
    commit_file(&repo, dir.path(), "feature.js", "new\n", "feat: new feature");
    repo.push_branch("dev/1.3.0").unwrap();

    let version = Version::new(1, 3, 0);
    ReleaseFinalizer::new(&repo).finalize(&version, "dev/1.3.0").unwrap();

    assert_eq!(repo.current_branch().unwrap(), "master");
    assert!(repo.local_tag_exists("release/1.3.0"));
    assert!(!repo.local_branch_exists("dev/1.3.0"));

    let refs = repo.list_remote_refs().unwrap();
    assert!(refs.contains(&"refs/tags/release/1.3.0".to_string()));
    assert!(!refs.contains(&"refs/heads/dev/1.3.0".to_string()));

    // The fast-forward merge landed the feature commit on master.
    assert!(dir.path().join("feature.js").exists());
}

#[test]
fn republishing_same_version_is_idempotent() {
    let (dir, repo) = init_work_repo();
    let _origin = add_bare_origin(&repo);
    repo.push_branch("master").unwrap();

    repo.checkout_branch("dev/1.3.0").unwrap();
    commit_file(&repo, dir.path(), "a.js", "a\n", "feat: a");

    let version = Version::new(1, 3, 0);
    let finalizer = ReleaseFinalizer::new(&repo);
    finalizer.finalize(&version, "dev/1.3.0").unwrap();

    // Publish the exact same version again.
    repo.checkout_branch("dev/1.3.0").unwrap();
    finalizer.finalize(&version, "dev/1.3.0").unwrap();

    let refs = repo.list_remote_refs().unwrap();
    let release_tags: Vec<&String> = refs
        .iter()
        .filter(|r| r.as_str() == "refs/tags/release/1.3.0")
        .collect();
    assert_eq!(release_tags.len(), 1);
    assert!(repo.local_tag_exists("release/1.3.0"));
}

#[test]
fn version_bump_lands_in_the_publish_commit() {
    let (dir, mut repo) = init_work_repo();
    let _origin = add_bare_origin(&repo);
    repo.push_branch("master").unwrap();
    repo.create_tag("release/1.2.0").unwrap();
    repo.push_tag("release/1.2.0").unwrap();

    commit_file(
        &repo,
        dir.path(),
        "package.json",
        "{\n  \"name\": \"demo\",\n  \"version\": \"1.0.0\",\n  \"scripts\": {\n    \"build\": \"npm run build\"\n  }\n}\n",
        "chore: add manifest",
    );

    // Remote already released 1.2.0, so the manifest is bumped; the rewrite
    // is committed before the branch sync, as in the publish sequence.
    let refs = repo.list_remote_refs().unwrap();
    assert!(matches!(
        version::resolve(&Version::new(1, 0, 0), &refs),
        VersionPlan::Bump { .. }
    ));
    let mut manifest = Manifest::load(dir.path()).unwrap();
    manifest.set_version(&Version::new(1, 3, 0)).unwrap();
    check_not_committed(&repo, || Ok("chore: bump version to 1.3.0".to_string())).unwrap();

    let mut synchronizer = BranchSynchronizer::new(&mut repo, "https://example.com/keys");
    synchronizer.sync("dev/1.3.0").unwrap();

    // The pushed branch carries the rewrite; nothing is left in the tree.
    assert!(!repo.stage_changes().unwrap());
    assert_eq!(
        Manifest::load(dir.path()).unwrap().version(),
        Some(Version::new(1, 3, 0))
    );
}

#[test]
fn stash_pop_restores_stashed_work() {
    let (dir, mut repo) = init_work_repo();

    // Nothing stashed yet.
    assert!(!repo.stash_pop_if_any().unwrap());

    // Stash a change through raw git2, then let the workflow pop it.
    fs::write(dir.path().join("README.md"), "stashed edit\n").unwrap();
    {
        let mut raw = Repository::open(dir.path()).unwrap();
        let signature = raw.signature().unwrap();
        raw.stash_save(&signature, "wip", None).unwrap();
    }
    assert_eq!(
        fs::read_to_string(dir.path().join("README.md")).unwrap(),
        "Initial\n"
    );

    assert!(repo.stash_pop_if_any().unwrap());
    assert_eq!(
        fs::read_to_string(dir.path().join("README.md")).unwrap(),
        "stashed edit\n"
    );
}
