//! Config commands - print the application config, encrypt secrets

use std::collections::BTreeMap;
use std::path::PathBuf;

use app2kube_core::secrets::{encrypt_secrets_section, generate_rsa_keys};
use app2kube_core::{Application, SecretKeys};
use console::style;

use crate::error::{CliError, Result};
use crate::{AppArgs, app};

const RSA_KEY_BITS: usize = 2048;

/// `KEY=value` lines for configmap, env and decrypted secrets, sorted by key
pub fn dotenv_lines(application: &Application, export: bool, quotes: bool) -> Result<Vec<String>> {
    let mut config: BTreeMap<&str, String> = BTreeMap::new();
    for (key, value) in application.config_map.iter().chain(&application.env) {
        config.insert(key, value.clone());
    }
    let secrets = application.decrypted_secrets()?;
    for (key, value) in &secrets {
        config.insert(key, value.clone());
    }

    let prefix = if export { "export " } else { "" };
    let quote = if quotes { "\"" } else { "" };
    Ok(config
        .iter()
        .map(|(key, value)| format!("{prefix}{key}={quote}{value}{quote}"))
        .collect())
}

pub async fn dotenv(args: &AppArgs, export: bool, quotes: bool) -> Result<()> {
    let application = app::load_for_config(args).await?;
    for line in dotenv_lines(&application, export, quotes)? {
        println!("{line}");
    }
    Ok(())
}

pub async fn domain(args: &AppArgs) -> Result<()> {
    let application = app::load_for_config(args).await?;
    for domain in application.domains() {
        println!("{domain}");
    }
    Ok(())
}

pub async fn secrets(args: &AppArgs) -> Result<()> {
    let application = app::load_for_config(args).await?;
    println!("secrets:");
    for (key, value) in application.decrypted_secrets()? {
        println!("  {key}: {value}");
    }
    Ok(())
}

/// Encrypt `--string` and the `secrets:` section of each file in place
pub fn encrypt(
    string: Option<&str>,
    files: &[PathBuf],
    password: Option<String>,
    encrypt_key: Option<String>,
) -> Result<()> {
    let string = string.filter(|s| !s.is_empty());
    if string.is_none() && files.is_empty() {
        return Err(CliError::config_with_help(
            "need to specify yaml files",
            "pass --string or one or more -f files",
        ));
    }

    let keys = SecretKeys {
        aes_password: password,
        rsa_public_key: encrypt_key,
        rsa_private_key: None,
    };

    if let Some(plaintext) = string {
        println!("{}", keys.encrypt(plaintext)?);
    }

    for path in files {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CliError::io(format!("cannot read {}: {e}", path.display())))?;

        match encrypt_secrets_section(&content, &keys)? {
            Some(updated) => {
                std::fs::write(path, updated)
                    .map_err(|e| CliError::io(format!("cannot write {}: {e}", path.display())))?;
                eprintln!(
                    "{} Encrypted secrets in {}",
                    style("✓").green().bold(),
                    path.display()
                );
            }
            None => tracing::debug!(path = %path.display(), "nothing to encrypt"),
        }
    }
    Ok(())
}

/// Print a fresh RSA key pair as shell exports
pub fn generate_keys() -> Result<()> {
    let (public_key, private_key) = generate_rsa_keys(RSA_KEY_BITS)?;
    println!("export APP2KUBE_ENCRYPT_KEY={public_key}");
    println!();
    println!("export APP2KUBE_DECRYPT_KEY={private_key}");
    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use app2kube_core::Values;

    fn application(keys: SecretKeys) -> Application {
        let values = Values::from_yaml(
            "\
name: app
configmap:
  LOG_LEVEL: info
env:
  APP_ENV: production
  PORT: 8080
secrets:
  DB_PASSWORD: hunter2
",
        )
        .unwrap();
        Application::from_values(&values, keys).unwrap()
    }

    #[test]
    fn test_dotenv_lines() {
        let lines = dotenv_lines(&application(SecretKeys::default()), false, false).unwrap();
        insta::assert_snapshot!(lines.join("\n"), @r"
        APP_ENV=production
        DB_PASSWORD=hunter2
        LOG_LEVEL=info
        PORT=8080
        ");
    }

    #[test]
    fn test_dotenv_export_quotes() {
        let lines = dotenv_lines(&application(SecretKeys::default()), true, true).unwrap();
        assert_eq!(lines[0], "export APP_ENV=\"production\"");
    }

    #[test]
    fn test_dotenv_decrypts_secrets() {
        let keys = SecretKeys {
            aes_password: Some("pass".to_string()),
            ..Default::default()
        };
        let encrypted = keys.encrypt("hunter2").unwrap();
        let mut app = application(keys);
        app.secrets.insert("DB_PASSWORD".to_string(), encrypted);

        let lines = dotenv_lines(&app, false, false).unwrap();
        assert!(lines.contains(&"DB_PASSWORD=hunter2".to_string()));
    }

    #[test]
    fn test_encrypt_requires_input() {
        let err = encrypt(None, &[], Some("pass".into()), None).unwrap_err();
        assert_eq!(err.to_string(), "need to specify yaml files");
        assert_eq!(err.exit_code(), crate::exit_codes::CONFIG_ERROR);
    }

    #[test]
    fn test_encrypt_file_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("values.yml");
        std::fs::write(&path, "name: web\nsecrets:\n  TOKEN: abc\nenv:\n  A: b\n").unwrap();

        encrypt(None, std::slice::from_ref(&path), Some("pass".into()), None).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("  TOKEN: AES#"));
        assert!(content.contains("env:\n  A: b\n"));

        // Already encrypted values are left alone
        encrypt(None, std::slice::from_ref(&path), Some("pass".into()), None).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), content);
    }
}
