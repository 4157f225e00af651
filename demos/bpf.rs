//! Manual exerciser for the v2 BPF filter program: load a synthesised
//! program against a scratch map, attach/detach it on a cgroup directory, or
//! query what's currently attached. Mirrors the shape of the teacher crate's
//! own `bpf` example, adapted to the map-lookup program and its own CLI.

use anyhow::Result;

#[cfg(feature = "cgroupsv2_devices")]
mod bpf_cli {
    use std::os::unix::io::AsRawFd;
    use std::path::Path;

    use anyhow::{bail, Context, Result};
    use clap::{Parser, Subcommand};
    use nix::fcntl::OFlag;
    use nix::sys::stat::Mode;

    use snap_device_cgroups::bpf::{map, prog, program};
    use snap_device_cgroups::device_key::{DeviceKey, DeviceKind};

    const LICENSE: &str = "GPL";

    #[derive(Parser)]
    #[command(about = "tools to test the BPF program for cgroups v2 devices")]
    struct Cli {
        #[arg(short = 'c', value_name = "CGROUP_DIR")]
        cgroup_dir: String,
        #[command(subcommand)]
        command: Cmd,
    }

    #[derive(Subcommand)]
    enum Cmd {
        /// query programs currently attached to the cgroup dir
        Query,
        /// detach a BPF program by id
        Detach {
            #[arg(value_name = "PROG_ID")]
            id: u32,
        },
        /// allow char major:minor, synthesize a fresh program and attach it
        Attach {
            #[arg(value_name = "MAJOR")]
            major: u32,
            #[arg(value_name = "MINOR")]
            minor: u32,
        },
    }

    pub fn run() -> Result<()> {
        let cli = Cli::parse();
        let cgroup_fd = nix::dir::Dir::open(
            cli.cgroup_dir.as_str(),
            OFlag::O_RDONLY | OFlag::O_DIRECTORY,
            Mode::from_bits(0o600).unwrap(),
        )
        .with_context(|| format!("opening cgroup dir {}", cli.cgroup_dir))?;

        match cli.command {
            Cmd::Query => {
                let progs = prog::query(cgroup_fd.as_raw_fd())?;
                for p in &progs {
                    println!("prog: id={}, fd={}", p.id, p.fd);
                }
            }
            Cmd::Detach { id } => {
                let progs = prog::query(cgroup_fd.as_raw_fd())?;
                let found = progs.iter().find(|p| p.id == id);
                let Some(found) = found else {
                    bail!("no attached program with id {id}");
                };
                prog::detach2(found.fd, cgroup_fd.as_raw_fd())?;
                println!("detach ok");
            }
            Cmd::Attach { major, minor } => {
                let map_fd = map::create("demo")?;
                let key = DeviceKey::new(DeviceKind::Char, major, minor);
                map::update(map_fd, &key, true)?;

                let bytecode = program::synthesize(map_fd);
                let prog_fd = prog::load(LICENSE, &bytecode)?;
                prog::attach(prog_fd, cgroup_fd.as_raw_fd())?;
                println!("attach ok");
            }
        }

        let _ = Path::new(&cli.cgroup_dir);
        Ok(())
    }
}

#[cfg(not(feature = "cgroupsv2_devices"))]
mod bpf_cli {
    use anyhow::{bail, Result};

    pub fn run() -> Result<()> {
        bail!("cgroupsv2_devices feature is not enabled");
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    bpf_cli::run()
}
