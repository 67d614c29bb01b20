use crate::config::generate::generate_starter_config;
use crate::config::user_config_path;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub fn init(stdout: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config_content = generate_starter_config();

    if stdout {
        print!("{}", config_content);
        return Ok(());
    }

    let config_path =
        user_config_path().unwrap_or_else(|| PathBuf::from("/etc/logship/config.yml"));

    match write_config(&config_path, &config_content) {
        Ok(()) => {
            println!("Config file written to {}", config_path.display());
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            eprintln!(
                "Error: Config file already exists at {}",
                config_path.display()
            );
            eprintln!("Remove it first or use --stdout to print the config");
            std::process::exit(1);
        }
        Err(e) => Err(e.into()),
    }
}

/// Write `content` to `path`, creating parent directories. Never overwrites.
pub fn write_config(path: &Path, content: &str) -> io::Result<()> {
    if path.exists() {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("{} already exists", path.display()),
        ));
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content)
}
