//! Config command

use std::path::Path;

use anyhow::Result;
use codehints::config::Config;

use super::project_dir;

/// Show the effective configuration for a project
pub async fn cmd_config_show(project: Option<&Path>) -> Result<()> {
  let root = project_dir(project)?;
  let config = Config::load_for_project(&root).await;

  let project_config = Config::project_config_path(&root);
  let user_config = Config::user_config_path();

  println!("Effective configuration for: {:?}", root);
  println!();

  if project_config.exists() {
    println!("Using project config: {:?}", project_config);
  } else if let Some(user_path) = user_config.filter(|p| p.exists()) {
    println!("Using user config: {:?}", user_path);
  } else {
    println!("Using default configuration (no config file found)");
  }
  println!();

  println!("{}", toml::to_string_pretty(&config)?);
  Ok(())
}
