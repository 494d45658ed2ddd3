// Copyright (c) 2023 The Cocoon Authors

//! Input validation of platform records.

use crate::acl::Interpreter;
use crate::cocoon::{Cocoon, Identity, Release};
use crate::error::CocoonError;
use crate::resources::ResourceSet;
use lazy_static::lazy_static;
use regex::Regex;

/// Languages cocoon code can be written in
pub const SUPPORTED_LANGUAGES: [&str; 1] = ["go"];

/// Minimum password length
pub const MIN_PASSWORD_LEN: usize = 8;

lazy_static! {
    static ref RES_NAME_REGEX: Regex = Regex::new(r"^[a-zA-Z0-9_]+$").expect("valid name regex");
    static ref GITHUB_URL_REGEX: Regex =
        Regex::new(r"^https?://github\.com/([a-zA-Z0-9_.-]+)/([a-zA-Z0-9_.-]+?)(\.git)?/?$")
            .expect("valid url regex");
    static ref COMMIT_ID_REGEX: Regex = Regex::new(r"^[0-9a-f]{40}$").expect("valid commit regex");
}

/// Resource names (cocoon ids, ledger names) are alphanumeric with underscores
/// ```
/// # use cocoon_models::validation::is_valid_res_name;
/// assert!(is_valid_res_name("lord_luggard"));
/// assert!(!is_valid_res_name("lord.luggard"));
/// assert!(!is_valid_res_name("lord-luggard"));
/// ```
pub fn is_valid_res_name(name: &str) -> bool {
    RES_NAME_REGEX.is_match(name)
}

/// Whether `url` points at a github repository
pub fn is_github_repo_url(url: &str) -> bool {
    GITHUB_URL_REGEX.is_match(url)
}

/// `(owner, repo)` of a github repository url
/// ```
/// # use cocoon_models::validation::github_repo_parts;
/// assert_eq!(
///     github_repo_parts("https://github.com/ncodes/cocoon-example-01"),
///     Some(("ncodes".to_string(), "cocoon-example-01".to_string()))
/// );
/// ```
pub fn github_repo_parts(url: &str) -> Option<(String, String)> {
    GITHUB_URL_REGEX
        .captures(url)
        .map(|c| (c[1].to_string(), c[2].to_string()))
}

/// A 40 character hex version is a commit id
pub fn is_github_commit_id(version: &str) -> bool {
    COMMIT_ID_REGEX.is_match(version)
}

/// Checks url, language and build parameters of a deployment
pub fn validate_deployment(url: &str, language: &str, build_param: &str) -> Result<(), CocoonError> {
    if url.is_empty() {
        return Err(CocoonError::InvalidArgument("url is required".into()));
    }
    if !is_github_repo_url(url) {
        return Err(CocoonError::InvalidArgument(
            "url is not a valid github repo url".into(),
        ));
    }
    if language.is_empty() {
        return Err(CocoonError::InvalidLanguage("language is required".into()));
    }
    if !SUPPORTED_LANGUAGES.contains(&language) {
        return Err(CocoonError::InvalidLanguage(format!(
            "language is not supported. Expects one of these values {:?}",
            SUPPORTED_LANGUAGES
        )));
    }
    if !build_param.is_empty()
        && serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(build_param).is_err()
    {
        return Err(CocoonError::InvalidArgument(
            "build parameter is not valid json".into(),
        ));
    }
    Ok(())
}

/// Checks a cocoon before creation or update
pub fn validate_cocoon(c: &Cocoon) -> Result<(), CocoonError> {
    if c.id.is_empty() {
        return Err(CocoonError::InvalidArgument("id is required".into()));
    }
    if !is_valid_res_name(&c.id) {
        return Err(CocoonError::InvalidResourceName(
            "id is not a valid resource name".into(),
        ));
    }
    validate_deployment(&c.url, &c.language, &c.build_param)?;
    if c.memory == 0 {
        return Err(CocoonError::InvalidArgument("memory is required".into()));
    }
    if c.cpu_share == 0 {
        return Err(CocoonError::InvalidArgument("CPU share is required".into()));
    }
    if ResourceSet::find(c.memory, c.cpu_share).is_none() {
        return Err(CocoonError::InvalidArgument("Unknown resource set".into()));
    }
    if c.num_signatories == 0 {
        return Err(CocoonError::InvalidArgument(
            "number of signatories cannot be less than 1".into(),
        ));
    }
    if c.sig_threshold == 0 {
        return Err(CocoonError::InvalidArgument(
            "signatory threshold cannot be less than 1".into(),
        ));
    }
    if (c.num_signatories as usize) < c.signatories.len() {
        return Err(CocoonError::InvalidArgument(
            "max signatories already added. You can't add more".into(),
        ));
    }
    c.firewall.validate()?;
    if !c.acl.is_empty() {
        Interpreter::new(&c.acl, false).check()?;
    }
    Ok(())
}

/// Checks a release before it is stored
pub fn validate_release(r: &Release) -> Result<(), CocoonError> {
    if r.id.is_empty() {
        return Err(CocoonError::InvalidArgument("id is required".into()));
    }
    if uuid::Uuid::parse_str(&r.id).is_err() {
        return Err(CocoonError::InvalidArgument("id is not a valid uuid".into()));
    }
    if r.cocoon_id.is_empty() {
        return Err(CocoonError::InvalidArgument("cocoon id is required".into()));
    }
    validate_deployment(&r.url, &r.language, &r.build_param)
}

/// Checks an identity before creation
pub fn validate_identity(i: &Identity) -> Result<(), CocoonError> {
    if i.email.is_empty() {
        Err(CocoonError::InvalidArgument("email is required".into()))
    } else if i.password.is_empty() {
        Err(CocoonError::InvalidArgument("password is required".into()))
    } else if i.password.len() < MIN_PASSWORD_LEN {
        Err(CocoonError::InvalidArgument(
            "password is too short. Minimum of 8 characters required".into(),
        ))
    } else {
        Ok(())
    }
}
