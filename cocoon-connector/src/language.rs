// Copyright (c) 2023 The Cocoon Authors

use crate::error::ConnectorError;
use cocoon_models::env::Env;
use cocoon_models::validation::github_repo_parts;
use serde_json::{Map, Value};
use std::path::PathBuf;

/// Package managers the go build script can vendor with
pub const SUPPORTED_GO_VENDOR_TOOLS: [&str; 2] = ["glide", "govendor"];

/// How cocoon code of one language is fetched, built and started
pub trait Language: Send + Sync {
    /// language tag, as found in a release
    fn name(&self) -> &'static str;

    /// image of the cocoon container
    fn image(&self) -> &'static str;

    /// where the source archive is unpacked before being moved
    fn download_destination(&self) -> String;

    /// where the source lives inside the container
    fn source_root_dir(&self) -> String;

    /// whether the source must be compiled before running
    fn requires_build(&self) -> bool;

    /// Validates and keeps the JSON encoded build parameters of a release
    fn set_build_params(&mut self, build_param: &str) -> Result<(), ConnectorError>;

    /// shell script compiling the source
    fn build_script(&self) -> String;

    /// shell script starting the code with `env` exported
    fn run_script(&self, env: &Env) -> String;
}

/// Go cocoon code
#[derive(Debug, Clone)]
pub struct GoLanguage {
    cocoon_id: String,
    owner: String,
    repo: String,
    user_home: PathBuf,
    go_path: String,
    run_root_bin: bool,
    build_params: Map<String, Value>,
}

impl GoLanguage {
    /// Go helper for the repository at `url`
    pub fn new(cocoon_id: &str, url: &str, run_root_bin: bool) -> Result<Self, ConnectorError> {
        let (owner, repo) = github_repo_parts(url)
            .ok_or_else(|| ConnectorError::SpecError(format!("not a github repository url: {}", url)))?;
        let user_home = directories::BaseDirs::new()
            .map(|d| d.home_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("/home"));
        Ok(GoLanguage {
            cocoon_id: cocoon_id.to_string(),
            owner,
            repo,
            user_home,
            go_path: "/go".to_string(),
            run_root_bin,
            build_params: Map::new(),
        })
    }

    /// Package manager chosen by the build parameters
    pub fn pkg_mgr(&self) -> Option<&str> {
        self.build_params.get("pkgMgr").and_then(Value::as_str)
    }
}

impl Language for GoLanguage {
    fn name(&self) -> &'static str {
        "go"
    }

    fn image(&self) -> &'static str {
        "ncodes/launch-go"
    }

    fn download_destination(&self) -> String {
        self.user_home
            .join("ccode/sources")
            .join(&self.cocoon_id)
            .join(&self.owner)
            .join(&self.repo)
            .to_string_lossy()
            .into_owned()
    }

    fn source_root_dir(&self) -> String {
        format!("{}/src/github.com/{}/{}", self.go_path, self.owner, self.repo)
    }

    fn requires_build(&self) -> bool {
        !self.run_root_bin
    }

    fn set_build_params(&mut self, build_param: &str) -> Result<(), ConnectorError> {
        if build_param.trim().is_empty() {
            self.build_params = Map::new();
            return Ok(());
        }
        let params: Map<String, Value> = serde_json::from_str(build_param).map_err(|e| {
            ConnectorError::BuildError(format!(
                "failed to parse build parameter. Expects valid json object. {}",
                e
            ))
        })?;
        match params.get("pkgMgr") {
            None => {}
            Some(Value::String(tool)) if SUPPORTED_GO_VENDOR_TOOLS.contains(&tool.as_str()) => {}
            Some(Value::String(_)) => {
                return Err(ConnectorError::BuildError(
                    "invalid `pkgMgr` value in build script".into(),
                ))
            }
            Some(_) => {
                return Err(ConnectorError::BuildError(
                    "invalid type for `pkgMgr` parameter, expected string".into(),
                ))
            }
        }
        self.build_params = params;
        Ok(())
    }

    fn build_script(&self) -> String {
        let mut cmds = vec![format!("cd {}", self.source_root_dir())];
        match self.pkg_mgr() {
            Some("glide") => cmds.push("glide install".into()),
            Some("govendor") => cmds.push("govendor fetch -v +out".into()),
            _ => {}
        }
        cmds.push("go build -v -o /bin/ccode".into());
        cmds.join(" && ")
    }

    fn run_script(&self, env: &Env) -> String {
        let mut cmds: Vec<String> = env
            .0
            .iter()
            .map(|(k, v)| format!("export {}='{}'", k, v.replace('\'', r"'\''")))
            .collect();
        if self.run_root_bin {
            cmds.push(format!("cd {}", self.source_root_dir()));
            cmds.push("./ccode".into());
        } else {
            cmds.push("ccode".into());
        }
        cmds.join(" && ")
    }
}

/// Helper of a supported language
pub fn find_language(
    name: &str,
    cocoon_id: &str,
    url: &str,
    run_root_bin: bool,
) -> Result<Box<dyn Language>, ConnectorError> {
    match name {
        "go" => Ok(Box::new(GoLanguage::new(cocoon_id, url, run_root_bin)?)),
        other => Err(ConnectorError::SpecError(format!(
            "cocoon code language ({}) not supported",
            other
        ))),
    }
}
