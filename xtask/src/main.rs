// Copyright (C) 2025 Paul Hampson
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License version 3 as  published by the
// Free Software Foundation.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE.  See the GNU General Public License for more
// details.
//
// You should have received a copy of the GNU General Public License along with
// this program.  If not, see <https://www.gnu.org/licenses/>.

use std::env;
use std::path::PathBuf;
use std::process::Command;

const FIRMWARE_PACKAGE: &str = "smartscale";
const MONITOR_PACKAGE: &str = "scale-monitor-cli";
const HOST_PACKAGES: [&str; 3] = ["smartscale-core", MONITOR_PACKAGE, "xtask"];
const FIRMWARE_TARGET: &str = "thumbv6m-none-eabi";
const CHIP: &str = "RP2040";

#[derive(Debug, PartialEq)]
enum BuildTarget {
    Firmware,
    Calibration,
    Monitor,
}

impl BuildTarget {
    fn features(&self) -> &'static [&'static str] {
        match self {
            BuildTarget::Calibration => &["--features", "calibration-mode"],
            _ => &[],
        }
    }
}

#[derive(Debug, PartialEq)]
enum Command_ {
    Build(BuildTarget),
    Flash(BuildTarget),
    Run(BuildTarget, Vec<String>),
    Attach,
    Test,
    Help,
}

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_usage();
        std::process::exit(1);
    }

    let command = match parse_command(&args[1..]) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("Error parsing command: {}", e);
            print_usage();
            std::process::exit(1);
        }
    };

    if let Err(e) = execute_command(command) {
        eprintln!("Error executing command: {}", e);
        std::process::exit(1);
    }
}

fn parse_command(args: &[String]) -> Result<Command_, String> {
    if args.is_empty() {
        return Err("No command provided".to_string());
    }

    let target = match args.get(1) {
        Some(target) => parse_build_target(target)?,
        None => BuildTarget::Firmware,
    };

    match args[0].as_str() {
        "build" => Ok(Command_::Build(target)),
        "flash" => match target {
            BuildTarget::Monitor => {
                Err("scale-monitor-cli is a host tool and cannot be flashed".to_string())
            }
            _ => Ok(Command_::Flash(target)),
        },
        "run" => {
            let extra_args = args.get(2..).map(<[String]>::to_vec).unwrap_or_default();
            Ok(Command_::Run(target, extra_args))
        }
        "attach" => match target {
            BuildTarget::Monitor => Err("attach only supports firmware targets".to_string()),
            _ => Ok(Command_::Attach),
        },
        "test" => Ok(Command_::Test),
        "help" => Ok(Command_::Help),
        _ => Err(format!("Unknown command: {}", args[0])),
    }
}

fn parse_build_target(target: &str) -> Result<BuildTarget, String> {
    match target {
        "firmware" => Ok(BuildTarget::Firmware),
        "calibration" => Ok(BuildTarget::Calibration),
        "scale-monitor-cli" | "monitor" => Ok(BuildTarget::Monitor),
        _ => Err(format!("Unknown target: {}", target)),
    }
}

fn execute_command(cmd: Command_) -> Result<(), String> {
    match cmd {
        Command_::Build(target) => build(&target),
        Command_::Flash(target) => flash(&target),
        Command_::Run(target, extra_args) => run(&target, &extra_args),
        Command_::Attach => attach(),
        Command_::Test => test(),
        Command_::Help => {
            print_usage();
            Ok(())
        }
    }
}

fn build(target: &BuildTarget) -> Result<(), String> {
    match target {
        BuildTarget::Monitor => {
            println!("Building scale-monitor-cli...");
            run_cargo(&["build", "--release", "--package", MONITOR_PACKAGE])?;
            println!("✓ scale-monitor-cli built successfully");
        }
        _ => {
            println!("Building {:?} firmware...", target);
            run_cargo_firmware("build", target)?;
            generate_bin(FIRMWARE_PACKAGE)?;
            println!("✓ Firmware built successfully");
        }
    }
    Ok(())
}

fn flash(target: &BuildTarget) -> Result<(), String> {
    println!("Building and flashing {:?} firmware...", target);
    let mut args = vec![
        "flash",
        "--release",
        "--package",
        FIRMWARE_PACKAGE,
        "--target",
        FIRMWARE_TARGET,
        "--chip",
        CHIP,
    ];
    args.extend_from_slice(target.features());
    run_cargo(&args)?;
    println!("✓ Firmware flashed successfully");
    Ok(())
}

fn run(target: &BuildTarget, extra_args: &[String]) -> Result<(), String> {
    match target {
        BuildTarget::Monitor => {
            println!("Building and running scale-monitor-cli...");
            if extra_args.is_empty() {
                println!("Note: the first serial port found is used when none is given");
                println!("Usage: cargo xtask run monitor [--tare] [--log-level LEVEL] <SERIAL_PORT>");
            }
            let mut args = vec!["run", "--release", "--package", MONITOR_PACKAGE];
            if !extra_args.is_empty() {
                args.push("--");
                args.extend(extra_args.iter().map(String::as_str));
            }
            run_cargo(&args)?;
        }
        _ => {
            // the probe-rs runner comes from .cargo/config.toml
            println!("Building and running {:?} firmware...", target);
            run_cargo_firmware("run", target)?;
        }
    }
    Ok(())
}

fn attach() -> Result<(), String> {
    let elf_path = firmware_elf(FIRMWARE_PACKAGE);

    if !elf_path.exists() {
        return Err(format!(
            "ELF binary not found at {}. Build the project first using 'cargo xtask build'.",
            elf_path.display()
        ));
    }

    let status = Command::new("probe-rs")
        .args(["attach", "--chip", CHIP])
        .arg(&elf_path)
        .status()
        .map_err(|e| format!("Failed to run probe-rs attach: {}", e))?;

    if !status.success() {
        return Err("Attach failed".to_string());
    }
    Ok(())
}

fn test() -> Result<(), String> {
    let mut args = vec!["test"];
    for package in HOST_PACKAGES {
        args.extend(["--package", package]);
    }
    run_cargo(&args)?;
    println!("✓ Host tests passed");
    Ok(())
}

fn run_cargo_firmware(subcommand: &str, target: &BuildTarget) -> Result<(), String> {
    let mut args = vec![
        subcommand,
        "--release",
        "--package",
        FIRMWARE_PACKAGE,
        "--target",
        FIRMWARE_TARGET,
    ];
    args.extend_from_slice(target.features());
    run_cargo(&args)
}

fn run_cargo(args: &[&str]) -> Result<(), String> {
    let status = Command::new("cargo")
        .args(args)
        .status()
        .map_err(|e| format!("Failed to run cargo {}: {}", args[0], e))?;

    if !status.success() {
        return Err(format!("cargo {} failed", args.join(" ")));
    }
    Ok(())
}

fn firmware_elf(package: &str) -> PathBuf {
    PathBuf::from(format!("target/{}/release/{}", FIRMWARE_TARGET, package))
}

fn generate_bin(package: &str) -> Result<(), String> {
    let elf_path = firmware_elf(package);
    let bin_path = elf_path.with_extension("bin");

    if !elf_path.exists() {
        return Err(format!("ELF binary not found at {}", elf_path.display()));
    }

    println!("Generating .bin file for {}...", package);

    let output = Command::new("arm-none-eabi-objcopy")
        .arg("-O")
        .arg("binary")
        .arg(&elf_path)
        .arg(&bin_path)
        .output()
        .map_err(|e| {
            format!(
                "Failed to run arm-none-eabi-objcopy: {}. Make sure arm-none-eabi-objcopy is installed.",
                e
            )
        })?;

    if !output.status.success() {
        return Err(format!(
            "Failed to generate .bin file for {}:\n{}",
            package,
            String::from_utf8_lossy(&output.stderr)
        ));
    }

    println!("✓ Generated {}", bin_path.display());
    Ok(())
}

fn print_usage() {
    eprintln!(
        "Usage: cargo xtask <COMMAND> [TARGET]\n\
         \n\
         Commands:\n\
         \tbuild       Build the specified target (firmware targets also get a .bin file)\n\
         \tflash       Build and flash a firmware target\n\
         \trun         Build and run the specified target\n\
         \tattach      Attach to the running firmware with probe-rs\n\
         \ttest        Run the host test suite\n\
         \thelp        Show this help message\n\
         \n\
         Targets:\n\
         \tfirmware        The weighing pipeline (default)\n\
         \tcalibration     Firmware built with the calibration-mode feature\n\
         \tmonitor         The scale-monitor-cli host tool\n\
         \n\
         Examples:\n\
         \tcargo xtask build                                   # Build the firmware\n\
         \tcargo xtask flash calibration                       # Flash the calibration routine\n\
         \tcargo xtask run firmware                            # Run the firmware with probe-rs\n\
         \tcargo xtask run monitor --tare /dev/ttyACM0         # Tare, then print weights\n\
         \tcargo xtask test                                    # Run host tests"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn target_defaults_to_firmware() {
        assert_eq!(
            parse_command(&args(&["build"])),
            Ok(Command_::Build(BuildTarget::Firmware))
        );
    }

    #[test]
    fn run_keeps_extra_arguments() {
        assert_eq!(
            parse_command(&args(&["run", "monitor", "--tare", "/dev/ttyACM0"])),
            Ok(Command_::Run(
                BuildTarget::Monitor,
                args(&["--tare", "/dev/ttyACM0"])
            ))
        );
    }

    #[test]
    fn host_tool_cannot_be_flashed() {
        assert!(parse_command(&args(&["flash", "monitor"])).is_err());
        assert!(parse_command(&args(&["attach", "monitor"])).is_err());
    }

    #[test]
    fn calibration_build_enables_feature() {
        assert_eq!(
            parse_command(&args(&["flash", "calibration"])),
            Ok(Command_::Flash(BuildTarget::Calibration))
        );
        assert_eq!(BuildTarget::Calibration.features(), ["--features", "calibration-mode"]);
        assert!(BuildTarget::Firmware.features().is_empty());
    }

    #[test]
    fn unknown_input_is_rejected() {
        assert!(parse_command(&[]).is_err());
        assert!(parse_command(&args(&["deploy"])).is_err());
        assert!(parse_command(&args(&["build", "bootloader"])).is_err());
    }
}
