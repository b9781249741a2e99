//! The read side of the job table.
//!
//! Jobs and their processes are registered by the embedding shell. The table is owned by the
//! main thread; `%`-expansion reads it through a [`crate::threads::perform_on_main`] hop. The
//! last backgrounded pid is an atomic readable from any thread.

use crate::threads::MainThread;
use crate::wchar::prelude::*;
use crate::FLOG;
use std::cell::RefCell;
use std::sync::atomic::{AtomicI32, Ordering};

pub type Pid = libc::pid_t;
pub type JobId = i32;

/// A single external process within a job.
#[derive(Clone, Debug)]
pub struct Process {
    pub pid: Pid,
    /// The command this process actually runs, which may differ from the job's command line,
    /// e.g. for a process inside a pipeline.
    pub actual_cmd: WString,
}

impl Process {
    pub fn new(pid: Pid, actual_cmd: WString) -> Self {
        Self { pid, actual_cmd }
    }
}

/// A job: a process group with the command line that started it.
#[derive(Clone, Debug)]
pub struct Job {
    pgid: Pid,
    job_id: JobId,
    command: WString,
    pub processes: Vec<Process>,
}

impl Job {
    pub fn new(pgid: Pid, job_id: JobId, command: WString, processes: Vec<Process>) -> Self {
        Self {
            pgid,
            job_id,
            command,
            processes,
        }
    }

    pub fn pgid(&self) -> Pid {
        self.pgid
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// The command line which started this job.
    pub fn command(&self) -> &wstr {
        &self.command
    }

    pub fn command_is_empty(&self) -> bool {
        self.command.is_empty()
    }
}

/// The job table. Jobs are ordered most recently backgrounded first.
static JOBS: MainThread<RefCell<Vec<Job>>> = MainThread::new(RefCell::new(Vec::new()));

/// Run a closure over the job list. Main thread only.
pub fn with_jobs<R>(f: impl FnOnce(&[Job]) -> R) -> R {
    let jobs = JOBS.get().borrow();
    f(&jobs)
}

/// Register a job. Main thread only.
pub fn add_job(job: Job) {
    FLOG!(proc, "adding job", job.job_id());
    JOBS.get().borrow_mut().insert(0, job);
}

/// Drop all jobs. Main thread only.
pub fn clear_jobs() {
    JOBS.get().borrow_mut().clear();
}

/// Look up a job by job id. Main thread only.
pub fn job_get(id: JobId) -> Option<Job> {
    with_jobs(|jobs| jobs.iter().find(|j| j.job_id() == id).cloned())
}

/// Our own process id.
pub fn getpid() -> Pid {
    unsafe { libc::getpid() }
}

/// The pgid of the last job to be backgrounded, or 0 if none.
static LAST_BG_PID: AtomicI32 = AtomicI32::new(0);

pub fn proc_last_bg_pid() -> Pid {
    LAST_BG_PID.load(Ordering::Relaxed)
}

pub fn set_proc_last_bg_pid(pid: Pid) {
    LAST_BG_PID.store(pid, Ordering::Relaxed);
}
