//! OS process enumeration for `%`-expansion.
//!
//! Yields `(command, pid)` pairs for processes visible to the current user, where `command` is
//! the first token of the process command line. Two backends exist: one reads the procfs
//! filesystem, the other drives sysctl(). No other module depends on the platform.

use crate::common::str2wcstring;
use crate::tokenizer::tok_first;
use crate::wchar::prelude::*;

pub type Pid = libc::pid_t;

cfg_if::cfg_if! {
    if #[cfg(target_os = "macos")] {

        /// sysctl() based process enumeration.
        pub struct ProcessIterator {
            pids: Vec<Pid>,
            idx: usize,
        }

        impl ProcessIterator {
            pub fn new() -> Self {
                Self {
                    pids: all_pids().unwrap_or_default(),
                    idx: 0,
                }
            }
        }

        /// Ask the kernel for the full process table. The size may grow between the probe and
        /// the fetch, in which case we retry.
        fn all_pids() -> Option<Vec<Pid>> {
            use std::mem::size_of;
            let mut mib = [
                libc::CTL_KERN,
                libc::KERN_PROC,
                libc::KERN_PROC_ALL,
                0,
            ];
            loop {
                // Probe the needed buffer size.
                let mut length: libc::size_t = 0;
                let ret = unsafe {
                    libc::sysctl(
                        mib.as_mut_ptr(),
                        3,
                        std::ptr::null_mut(),
                        &mut length,
                        std::ptr::null_mut(),
                        0,
                    )
                };
                if ret == -1 {
                    return None;
                }

                let count = length as usize / size_of::<libc::kinfo_proc>();
                let mut procs: Vec<libc::kinfo_proc> = Vec::with_capacity(count);
                let ret = unsafe {
                    libc::sysctl(
                        mib.as_mut_ptr(),
                        3,
                        procs.as_mut_ptr().cast(),
                        &mut length,
                        std::ptr::null_mut(),
                        0,
                    )
                };
                if ret == 0 {
                    let filled = length as usize / size_of::<libc::kinfo_proc>();
                    unsafe { procs.set_len(filled) };
                    return Some(procs.iter().map(|p| p.kp_proc.p_pid).collect());
                }
                if errno::errno().0 != libc::ENOMEM {
                    return None;
                }
                // The table grew; probe again.
            }
        }

        /// Fetch the command for a pid via KERN_PROCARGS2. The buffer holds an argument count
        /// followed by the executable path.
        fn name_for_pid(pid: Pid) -> Option<WString> {
            use std::mem::size_of;
            let mut maxarg: libc::c_int = 0;
            let mut size = size_of::<libc::c_int>() as libc::size_t;
            let mut mib = [libc::CTL_KERN, libc::KERN_ARGMAX];
            let ret = unsafe {
                libc::sysctl(
                    mib.as_mut_ptr(),
                    2,
                    (&mut maxarg as *mut libc::c_int).cast(),
                    &mut size,
                    std::ptr::null_mut(),
                    0,
                )
            };
            if ret == -1 || maxarg <= 0 {
                return None;
            }

            let mut args = vec![0_u8; maxarg as usize];
            let mut size = args.len() as libc::size_t;
            let mut mib = [libc::CTL_KERN, libc::KERN_PROCARGS2, pid];
            let ret = unsafe {
                libc::sysctl(
                    mib.as_mut_ptr(),
                    3,
                    args.as_mut_ptr().cast(),
                    &mut size,
                    std::ptr::null_mut(),
                    0,
                )
            };
            if ret == -1 {
                return None;
            }

            let rest = args.get(size_of::<libc::c_int>()..)?;
            let end = rest.iter().position(|&b| b == 0).unwrap_or(rest.len());
            let cmd = str2wcstring(&rest[..end]);
            if cmd.is_empty() {
                None
            } else {
                Some(cmd)
            }
        }

        impl Iterator for ProcessIterator {
            type Item = (WString, Pid);

            fn next(&mut self) -> Option<Self::Item> {
                while self.idx < self.pids.len() {
                    let pid = self.pids[self.idx];
                    self.idx += 1;
                    if let Some(name) = name_for_pid(pid) {
                        return Some((name, pid));
                    }
                }
                None
            }
        }

    } else {

        /// procfs based process enumeration.
        pub struct ProcessIterator {
            dir: Option<std::fs::ReadDir>,
        }

        impl ProcessIterator {
            pub fn new() -> Self {
                Self {
                    dir: std::fs::read_dir("/proc").ok(),
                }
            }
        }

        /// Read the first token of the command line for the process directory. Falls back to
        /// the bare command name for processes which have no command line (or a masked one).
        fn command_for_proc_entry(path: &std::path::Path) -> Option<WString> {
            let cmdline = std::fs::read(path.join("cmdline")).unwrap_or_default();
            // Arguments are NUL-separated; the first one is the command.
            let arg0 = cmdline.split(|&b| b == 0).next().unwrap_or(&[]);
            let mut cmd = tok_first(&str2wcstring(arg0));
            if cmd.is_empty() {
                let comm = std::fs::read(path.join("comm")).ok()?;
                cmd = tok_first(&str2wcstring(&comm));
            }
            if cmd.is_empty() {
                None
            } else {
                Some(cmd)
            }
        }

        impl Iterator for ProcessIterator {
            type Item = (WString, Pid);

            fn next(&mut self) -> Option<Self::Item> {
                let dir = self.dir.as_mut()?;
                for entry in dir.by_ref() {
                    let Ok(entry) = entry else { continue };
                    // Only numeric entries name processes.
                    let name = entry.file_name();
                    let Some(name) = name.to_str() else { continue };
                    if name.is_empty() || !name.bytes().all(|b| b.is_ascii_digit()) {
                        continue;
                    }
                    let Ok(pid) = name.parse::<Pid>() else { continue };

                    // Only report processes owned by the current user.
                    let Ok(md) = entry.metadata() else { continue };
                    use std::os::unix::fs::MetadataExt;
                    if md.uid() != unsafe { libc::getuid() } {
                        continue;
                    }

                    if let Some(cmd) = command_for_proc_entry(&entry.path()) {
                        return Some((cmd, pid));
                    }
                }
                None
            }
        }
    }
}
