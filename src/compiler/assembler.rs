//! External macro-assembler invocation
//!
//! The rendered program is written next to the requested binary and handed
//! to the assembler as
//! `<assembler> <asm> -o <bin> -L <lst> -l <sym> --format=flat`.

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{info, warn};

/// Paths of every file a build produces
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifacts {
    pub assembly: PathBuf,
    pub rom: PathBuf,
    pub list: PathBuf,
    pub symbols: PathBuf,
}

impl Artifacts {
    /// Derives `.asm`, `.lst` and `.sym` paths from the binary path
    pub fn for_rom(rom: impl Into<PathBuf>) -> Self {
        let rom = rom.into();
        Self {
            assembly: rom.with_extension("asm"),
            list: rom.with_extension("lst"),
            symbols: rom.with_extension("sym"),
            rom,
        }
    }
}

/// Outcome of a build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RomInfo {
    pub is_successful: bool,
    /// Always written
    pub assembly_path: PathBuf,
    /// Present only when the assembler succeeded
    pub rom_path: Option<PathBuf>,
    pub list_path: Option<PathBuf>,
    pub symbol_path: Option<PathBuf>,
    /// Combined stdout and stderr of the assembler
    pub output: String,
}

impl RomInfo {
    /// The program was written but no assembler was run
    pub fn unassembled(assembly_path: PathBuf) -> Self {
        Self {
            is_successful: false,
            assembly_path,
            rom_path: None,
            list_path: None,
            symbol_path: None,
            output: String::new(),
        }
    }
}

/// Writes `program` to the assembly path of `artifacts`
pub fn write_program(program: &str, artifacts: &Artifacts) -> Result<()> {
    if let Some(parent) = artifacts.assembly.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
    std::fs::write(&artifacts.assembly, program).map_err(|e| Error::io(&artifacts.assembly, e))
}

/// Runs the assembler over an already written program and waits for it
pub fn assemble(assembler: &Path, artifacts: &Artifacts) -> Result<RomInfo> {
    info!(assembler = %assembler.display(), input = %artifacts.assembly.display(), "Running assembler");
    let result = Command::new(assembler)
        .arg(&artifacts.assembly)
        .arg("-o")
        .arg(&artifacts.rom)
        .arg("-L")
        .arg(&artifacts.list)
        .arg("-l")
        .arg(&artifacts.symbols)
        .arg("--format=flat")
        .output()
        .map_err(|e| Error::Assembler(format!("failed to run {}: {}", assembler.display(), e)))?;

    let mut output = String::from_utf8_lossy(&result.stdout).into_owned();
    output.push_str(&String::from_utf8_lossy(&result.stderr));

    if !result.status.success() {
        warn!(status = ?result.status.code(), "Assembly failed");
        return Ok(RomInfo {
            output,
            ..RomInfo::unassembled(artifacts.assembly.clone())
        });
    }

    info!(rom = %artifacts.rom.display(), "Assembly succeeded");
    Ok(RomInfo {
        is_successful: true,
        assembly_path: artifacts.assembly.clone(),
        rom_path: Some(artifacts.rom.clone()),
        list_path: Some(artifacts.list.clone()),
        symbol_path: Some(artifacts.symbols.clone()),
        output,
    })
}

/// Starts `tool` on `file` without waiting; failures are logged only
pub fn launch(tool: &Path, file: &Path) {
    if let Err(e) = Command::new(tool).arg(file).spawn() {
        warn!(
            tool = %tool.display(),
            file = %file.display(),
            error = %e,
            "Failed to launch"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_paths() {
        let artifacts = Artifacts::for_rom("out/game.bin");
        assert_eq!(artifacts.assembly, PathBuf::from("out/game.asm"));
        assert_eq!(artifacts.list, PathBuf::from("out/game.lst"));
        assert_eq!(artifacts.symbols, PathBuf::from("out/game.sym"));
        assert_eq!(artifacts.rom, PathBuf::from("out/game.bin"));
    }

    #[test]
    fn test_missing_assembler() {
        let dir = tempfile::tempdir().unwrap();
        let artifacts = Artifacts::for_rom(dir.path().join("game.bin"));
        write_program("; empty\n", &artifacts).unwrap();
        let err = assemble(&dir.path().join("no-such-assembler"), &artifacts).unwrap_err();
        assert!(matches!(err, Error::Assembler(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_exit_status_decides_success() {
        let dir = tempfile::tempdir().unwrap();
        let artifacts = Artifacts::for_rom(dir.path().join("game.bin"));
        write_program("; empty\n", &artifacts).unwrap();

        let info = assemble(Path::new("false"), &artifacts).unwrap();
        assert!(!info.is_successful);
        assert_eq!(info.rom_path, None);
        assert_eq!(info.assembly_path, artifacts.assembly);

        let info = assemble(Path::new("true"), &artifacts).unwrap();
        assert!(info.is_successful);
        assert_eq!(info.symbol_path, Some(artifacts.symbols.clone()));
    }

    #[test]
    fn test_launch_failure_is_ignored() {
        launch(Path::new("/nonexistent/editor"), Path::new("game.asm"));
    }
}
