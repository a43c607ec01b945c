//! The newline-terminated ASCII wire protocol:
//!
//! ```text
//! PROBE                                        -> Q <int>
//! REQUEST <jobid> <taskid> <dur_ms> <sched_ip>  -> RID <hex8>
//! ASSIGN <jobid> <taskid> <dur_ms> <sched_ip>   -> STARTED
//! ASSIGN_RID <rid>                              -> STARTED | ERR
//! CANCEL <rid>                                  -> CANCELLED
//! DONE <jobid> <taskid>                         (no reply; fire-and-forget)
//! ```
//!
//! One request, one reply, per connection — every line here is both framing
//! and payload, so encode/decode never has to worry about message
//! boundaries beyond "read one line, write one line".

use crate::error::NetError;
use sparrow_core::ids::{JobId, ReservationId, TaskId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Probe,
    Request {
        job: JobId,
        task: TaskId,
        dur_ms: u64,
        sched_ip: String,
    },
    Assign {
        job: JobId,
        task: TaskId,
        dur_ms: u64,
        sched_ip: String,
    },
    AssignRid {
        rid: ReservationId,
    },
    Cancel {
        rid: ReservationId,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Queue(u32),
    Rid(ReservationId),
    Started,
    Err,
    Cancelled,
}

/// The worker → scheduler completion callback, framed identically to a
/// request line but sent on its own connection with no reply expected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Done {
    pub job: JobId,
    pub task: TaskId,
}

fn malformed(line: &str) -> NetError {
    NetError::MalformedRequest(line.to_string())
}

impl Request {
    pub fn encode(&self) -> String {
        match self {
            Request::Probe => "PROBE".to_string(),
            Request::Request {
                job,
                task,
                dur_ms,
                sched_ip,
            } => format!("REQUEST {job} {task} {dur_ms} {sched_ip}"),
            Request::Assign {
                job,
                task,
                dur_ms,
                sched_ip,
            } => format!("ASSIGN {job} {task} {dur_ms} {sched_ip}"),
            Request::AssignRid { rid } => format!("ASSIGN_RID {rid}"),
            Request::Cancel { rid } => format!("CANCEL {rid}"),
        }
    }

    pub fn parse(line: &str) -> Result<Self, NetError> {
        let line = line.trim();
        let mut parts = line.split_ascii_whitespace();
        let verb = parts.next().ok_or_else(|| malformed(line))?;
        match verb {
            "PROBE" => Ok(Request::Probe),
            "REQUEST" | "ASSIGN" => {
                let job = parts.next().ok_or_else(|| malformed(line))?;
                let task = parts.next().ok_or_else(|| malformed(line))?;
                let dur_ms: u64 = parts
                    .next()
                    .ok_or_else(|| malformed(line))?
                    .parse()
                    .map_err(|_| malformed(line))?;
                let sched_ip = parts.next().ok_or_else(|| malformed(line))?.to_string();
                let job = JobId(job.to_string());
                let task = TaskId(task.to_string());
                if verb == "REQUEST" {
                    Ok(Request::Request {
                        job,
                        task,
                        dur_ms,
                        sched_ip,
                    })
                } else {
                    Ok(Request::Assign {
                        job,
                        task,
                        dur_ms,
                        sched_ip,
                    })
                }
            }
            "ASSIGN_RID" => {
                let rid = parts.next().ok_or_else(|| malformed(line))?;
                Ok(Request::AssignRid {
                    rid: ReservationId(rid.to_string()),
                })
            }
            "CANCEL" => {
                let rid = parts.next().ok_or_else(|| malformed(line))?;
                Ok(Request::Cancel {
                    rid: ReservationId(rid.to_string()),
                })
            }
            _ => Err(malformed(line)),
        }
    }
}

impl Reply {
    pub fn encode(&self) -> String {
        match self {
            Reply::Queue(q) => format!("Q {q}"),
            Reply::Rid(rid) => format!("RID {rid}"),
            Reply::Started => "STARTED".to_string(),
            Reply::Err => "ERR".to_string(),
            Reply::Cancelled => "CANCELLED".to_string(),
        }
    }

    /// Parses a `PROBE` reply. A malformed reply is not a parse error to
    /// propagate: the live variant treats it as an infinite queue length,
    /// which the caller maps to `QueueLen::UNKNOWN`.
    pub fn parse_queue_len(line: &str) -> Option<u32> {
        let line = line.trim();
        let mut parts = line.split_ascii_whitespace();
        if parts.next() != Some("Q") {
            return None;
        }
        parts.next()?.parse().ok()
    }

    pub fn parse_rid(line: &str) -> Result<ReservationId, NetError> {
        let line = line.trim();
        let mut parts = line.split_ascii_whitespace();
        if parts.next() != Some("RID") {
            return Err(malformed(line));
        }
        let rid = parts.next().ok_or_else(|| malformed(line))?;
        Ok(ReservationId(rid.to_string()))
    }

    pub fn parse_started_or_err(line: &str) -> Result<bool, NetError> {
        match line.trim() {
            "STARTED" => Ok(true),
            "ERR" => Ok(false),
            other => Err(malformed(other)),
        }
    }

    pub fn parse_cancelled(line: &str) -> Result<(), NetError> {
        match line.trim() {
            "CANCELLED" => Ok(()),
            other => Err(malformed(other)),
        }
    }
}

impl Done {
    pub fn encode(&self) -> String {
        format!("DONE {} {}", self.job, self.task)
    }

    pub fn parse(line: &str) -> Result<Self, NetError> {
        let line = line.trim();
        let mut parts = line.split_ascii_whitespace();
        if parts.next() != Some("DONE") {
            return Err(malformed(line));
        }
        let job = parts.next().ok_or_else(|| malformed(line))?;
        let task = parts.next().ok_or_else(|| malformed(line))?;
        Ok(Done {
            job: JobId(job.to_string()),
            task: TaskId(task.to_string()),
        })
    }
}
