use std::collections::HashMap;
use std::fs;
use std::path::{
  Path,
  PathBuf
};
use std::time::Duration;

use anyhow::{
  Context,
  anyhow
};
use tracing::{
  debug,
  info,
  trace,
  warn
};
use url::Url;

use crate::store::remote::DEFAULT_API_URL;

pub const RC_ENV: &str = "JUSTDOITRC";
pub const RC_FILE: &str = ".justdoitrc";

const DEFAULT_DATA_DIR: &str =
  ".justdoit";
const DEFAULT_TIMEOUT_SECS: u64 = 15;

/// Which task store a command runs
/// against.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
)]
pub enum StoreKind {
  Local,
  Remote
}

#[derive(Debug, Clone)]
pub struct Config {
  map: HashMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

impl Config {
  /// Built-in defaults with no rc file
  /// applied.
  pub fn defaults() -> Self {
    let mut cfg = Config {
      map:          HashMap::new(),
      loaded_files: vec![]
    };

    for (key, value) in [
      (
        "data.location",
        "~/.justdoit"
      ),
      ("store", "local"),
      ("remote.url", DEFAULT_API_URL),
      ("remote.timeout", "15"),
      ("color", "on")
    ] {
      cfg.map.insert(
        key.to_string(),
        value.to_string()
      );
    }
    cfg
  }

  #[tracing::instrument(skip(
    rc_override
  ))]
  pub fn load(
    rc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Self::defaults();

    let rc = resolve_rc_path(
      rc_override
    )?;
    if let Some(path) = rc {
      info!(rc = %path.display(), "loading rc file");
      cfg.load_file(&path)?;
    } else {
      debug!(
        "no rc file found; using \
         defaults"
      );
    }

    Ok(cfg)
  }

  #[tracing::instrument(skip(
    self, overrides
  ))]
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (k, v) in overrides {
      let key = k
        .strip_prefix("rc.")
        .unwrap_or(&k)
        .to_string();
      debug!(key = %key, value = %v, "applying override");
      self.map.insert(key, v);
    }
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<String> {
    self.map.get(key).cloned()
  }

  pub fn store_kind(
    &self
  ) -> anyhow::Result<StoreKind> {
    let raw = self
      .get("store")
      .unwrap_or_else(|| {
        "local".to_string()
      });
    match raw
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "local" => Ok(StoreKind::Local),
      | "remote" => {
        Ok(StoreKind::Remote)
      }
      | other => {
        Err(anyhow!(
          "invalid store setting: \
           {other} (expected local or \
           remote)"
        ))
      }
    }
  }

  /// Base URL of the REST API, with a
  /// trailing slash.
  pub fn remote_url(
    &self
  ) -> anyhow::Result<Url> {
    let raw = self
      .get("remote.url")
      .unwrap_or_else(|| {
        DEFAULT_API_URL.to_string()
      });
    let mut url = Url::parse(
      raw.trim()
    )
    .with_context(|| {
      format!(
        "invalid remote.url: {raw}"
      )
    })?;
    if !url.path().ends_with('/') {
      let path =
        format!("{}/", url.path());
      url.set_path(&path);
    }
    Ok(url)
  }

  pub fn remote_timeout(
    &self
  ) -> anyhow::Result<Duration> {
    let secs = match self
      .get("remote.timeout")
    {
      | Some(raw) => {
        raw.trim().parse::<u64>().with_context(|| {
          format!("invalid remote.timeout (expected seconds): {raw}")
        })?
      }
      | None => DEFAULT_TIMEOUT_SECS
    };
    Ok(Duration::from_secs(secs))
  }

  #[tracing::instrument(skip(self))]
  fn load_file(
    &mut self,
    path: &Path
  ) -> anyhow::Result<()> {
    let path = expand_tilde(path);
    let text =
      fs::read_to_string(&path)
        .with_context(|| {
          format!(
            "failed to read {}",
            path.display()
          )
        })?;

    self
      .loaded_files
      .push(path.clone());

    let base_dir = path
      .parent()
      .map(|p| p.to_path_buf())
      .unwrap_or_else(|| {
        PathBuf::from(".")
      });

    for (line_num, raw_line) in
      text.lines().enumerate()
    {
      let mut line = raw_line.trim();
      if let Some((before, _)) =
        line.split_once('#')
      {
        line = before.trim();
      }
      if line.is_empty() {
        continue;
      }

      if let Some(include_rest) =
        line.strip_prefix("include ")
      {
        let include_path =
          resolve_include_path(
            &base_dir,
            include_rest.trim()
          )?;
        if self
          .loaded_files
          .contains(&include_path)
        {
          warn!(include = %include_path.display(), "include cycle; skipping");
          continue;
        }
        debug!(
            file = %path.display(),
            include = %include_path.display(),
            line = line_num + 1,
            "processing include"
        );

        if include_path.exists() {
          self
            .load_file(&include_path)?;
        } else {
          warn!(include = %include_path.display(), "include file does not exist; skipping");
        }
        continue;
      }

      let (k, v) = line
        .split_once('=')
        .ok_or_else(|| {
          anyhow!(
            "invalid config line \
             {}:{}: {}",
            path.display(),
            line_num + 1,
            raw_line
          )
        })?;

      let key = k.trim().to_string();
      let value = v.trim().to_string();
      trace!(key = %key, value = %value, "loaded config key");
      self.map.insert(key, value);
    }

    Ok(())
  }
}

#[tracing::instrument(skip(
  cfg,
  override_dir
))]
pub fn resolve_data_dir(
  cfg: &Config,
  override_dir: Option<&Path>
) -> anyhow::Result<PathBuf> {
  let dir = if let Some(path) =
    override_dir
  {
    path.to_path_buf()
  } else if let Some(cfg_value) =
    cfg.get("data.location")
  {
    expand_tilde(Path::new(&cfg_value))
  } else {
    default_data_dir()?
  };

  if !dir.exists() {
    info!(dir = %dir.display(), "creating data directory");
    fs::create_dir_all(&dir)
      .with_context(|| {
        format!(
          "failed to create {}",
          dir.display()
        )
      })?;
  }

  Ok(dir)
}

#[tracing::instrument(skip(
  override_path
))]
fn resolve_rc_path(
  override_path: Option<&Path>
) -> anyhow::Result<Option<PathBuf>> {
  if let Some(path) = override_path {
    return Ok(Some(path.to_path_buf()));
  }

  if let Ok(rc_env) =
    std::env::var(RC_ENV)
  {
    if rc_env == "/dev/null" {
      return Ok(None);
    }
    return Ok(Some(PathBuf::from(
      rc_env
    )));
  }

  let Some(home) = dirs::home_dir()
  else {
    warn!(
      "cannot determine home \
       directory; skipping rc file"
    );
    return Ok(None);
  };
  let candidate = home.join(RC_FILE);
  if candidate.exists() {
    return Ok(Some(candidate));
  }

  Ok(None)
}

fn default_data_dir()
-> anyhow::Result<PathBuf> {
  let home = dirs::home_dir()
    .ok_or_else(|| {
      anyhow!(
        "cannot determine home \
         directory"
      )
    })?;
  Ok(home.join(DEFAULT_DATA_DIR))
}

fn resolve_include_path(
  base_dir: &Path,
  include: &str
) -> anyhow::Result<PathBuf> {
  if include.trim().is_empty() {
    return Err(anyhow!(
      "include path cannot be empty"
    ));
  }

  let raw = PathBuf::from(include);
  let expanded = expand_tilde(&raw);
  if expanded.is_absolute() {
    Ok(expanded)
  } else {
    Ok(base_dir.join(expanded))
  }
}

fn expand_tilde(
  path: &Path
) -> PathBuf {
  let text = path.to_string_lossy();
  if let Some(rest) =
    text.strip_prefix("~/")
    && let Some(home) = dirs::home_dir()
  {
    return home.join(rest);
  }
  path.to_path_buf()
}

#[cfg(test)]
mod tests {
  use tempfile::tempdir;

  use super::*;

  #[test]
  fn defaults_cover_every_key() {
    let cfg = Config::defaults();
    assert_eq!(
      cfg.get("data.location")
        .as_deref(),
      Some("~/.justdoit")
    );
    assert_eq!(
      cfg.store_kind().expect("kind"),
      StoreKind::Local
    );
    assert_eq!(
      cfg
        .remote_url()
        .expect("url")
        .as_str(),
      "http://localhost:8080/"
    );
    assert_eq!(
      cfg
        .remote_timeout()
        .expect("timeout"),
      Duration::from_secs(15)
    );
  }

  #[test]
  fn rc_file_with_comments_and_include(
  ) {
    let temp =
      tempdir().expect("tempdir");
    let shared =
      temp.path().join("shared.rc");
    fs::write(
      &shared,
      "remote.url = https://tasks.example.com/app\n"
    )
    .expect("write include");
    let rc = temp.path().join("main.rc");
    fs::write(
      &rc,
      "# personal settings\nstore = remote   # use the API\ninclude shared.rc\n\ncolor=off\n"
    )
    .expect("write rc");

    let cfg = Config::load(Some(&rc))
      .expect("load rc");
    assert_eq!(
      cfg.loaded_files,
      vec![rc.clone(), shared.clone()]
    );
    assert_eq!(
      cfg.store_kind().expect("kind"),
      StoreKind::Remote
    );
    assert_eq!(
      cfg.get("color").as_deref(),
      Some("off")
    );
    assert_eq!(
      cfg
        .remote_url()
        .expect("url")
        .as_str(),
      "https://tasks.example.com/app/"
    );
  }

  #[test]
  fn invalid_line_is_reported_with_location(
  ) {
    let temp =
      tempdir().expect("tempdir");
    let rc = temp.path().join("bad.rc");
    fs::write(&rc, "store = local\nnonsense\n")
      .expect("write rc");

    let err = Config::load(Some(&rc))
      .expect_err("bad line");
    assert!(
      err.to_string().contains(":2:")
    );
  }

  #[test]
  fn overrides_strip_rc_prefix_and_validate(
  ) {
    let mut cfg = Config::defaults();
    cfg.apply_overrides(vec![
      (
        "rc.store".to_string(),
        "cloud".to_string()
      ),
      (
        "remote.timeout".to_string(),
        "3".to_string()
      ),
    ]);

    assert!(cfg.store_kind().is_err());
    assert_eq!(
      cfg
        .remote_timeout()
        .expect("timeout"),
      Duration::from_secs(3)
    );
  }

  #[test]
  fn data_dir_override_is_created() {
    let temp =
      tempdir().expect("tempdir");
    let target =
      temp.path().join("nested/data");
    let dir = resolve_data_dir(
      &Config::defaults(),
      Some(&target)
    )
    .expect("resolve");
    assert_eq!(dir, target);
    assert!(target.is_dir());
  }
}
