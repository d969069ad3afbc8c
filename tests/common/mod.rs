//! Common test utilities and helpers
#![allow(dead_code, unused_imports)]

pub mod git;

pub use self::git::{
    advance_upstream, configure_git_user, create_test_commit, git, is_git_available,
    setup_cloned_repo, setup_git_repo,
};
