//! Asymmetric fence pair.
//!
//! Readers issue [`light`] fences, which compile down to nothing on hosts
//! where the writer side can issue a process-wide barrier; the writer
//! promotes them on demand with [`heavy`], which forces a full sequentially
//! consistent fence onto every other running thread of the process before
//! returning. This split is what keeps the read-side hot path free of fence
//! instructions: the expensive ordering is paid only by the rare writer.
//!
//! On Linux the heavy fence is the expedited private membarrier syscall,
//! which must be registered once per process via [`register`] before first
//! use. Hosts without such a primitive lose the asymmetry: [`light`] is
//! promoted to a full hardware fence and [`heavy`] degrades to one as well,
//! keeping the API and the ordering contract intact at the cost of the
//! read-side fast path.

use std::sync::atomic::Ordering;
#[cfg(target_os = "linux")]
use std::sync::atomic::compiler_fence;
#[cfg(not(target_os = "linux"))]
use std::sync::atomic::fence;

use crate::error::RcuInitError;

/// Light fence issued by readers on their own thread.
///
/// Compiler-only where the heavy fence is a true process-wide barrier; it
/// provides no cross-thread ordering on its own and exists to pair with a
/// concurrent [`heavy`] fence.
#[inline]
pub fn light() {
    #[cfg(target_os = "linux")]
    compiler_fence(Ordering::SeqCst);
    #[cfg(not(target_os = "linux"))]
    fence(Ordering::SeqCst);
}

/// Heavy fence issued by a grace-period initiator.
///
/// When this returns, a full sequentially consistent fence has executed on
/// every other currently-running thread of the process at some point after
/// the call began.
///
/// # Panics
///
/// Panics if the underlying syscall fails, which after a successful
/// [`register`] only happens when the process skipped registration. A
/// silently weakened fence would corrupt arbitrary consumers, so the
/// failure aborts loudly instead.
#[inline]
pub fn heavy() {
    #[cfg(target_os = "linux")]
    linux::heavy();
    #[cfg(not(target_os = "linux"))]
    fence(Ordering::SeqCst);
}

/// Register the process as a user of the heavy fence.
///
/// Idempotent; every [`RcuDomain`](crate::RcuDomain) constructor funnels
/// through here. Failure means the host kernel cannot provide the
/// asymmetric primitive and the process must not use the crate.
pub fn register() -> Result<(), RcuInitError> {
    #[cfg(target_os = "linux")]
    {
        linux::register()
    }
    #[cfg(not(target_os = "linux"))]
    {
        Ok(())
    }
}

#[cfg(target_os = "linux")]
mod linux {
    use std::sync::OnceLock;

    use crate::error::RcuInitError;

    // The membarrier command set is not exported by the libc crate; values
    // are from include/uapi/linux/membarrier.h.
    const MEMBARRIER_CMD_QUERY: libc::c_int = 0;
    const MEMBARRIER_CMD_PRIVATE_EXPEDITED: libc::c_int = 1 << 3;
    const MEMBARRIER_CMD_REGISTER_PRIVATE_EXPEDITED: libc::c_int = 1 << 4;

    static REGISTRATION: OnceLock<Result<(), RcuInitError>> = OnceLock::new();

    fn sys_membarrier(cmd: libc::c_int) -> libc::c_long {
        // SAFETY: membarrier takes no pointer arguments; flags and cpu_id
        // are zero for every command used here.
        unsafe { libc::syscall(libc::SYS_membarrier, cmd, 0 as libc::c_int, 0 as libc::c_int) }
    }

    pub(super) fn register() -> Result<(), RcuInitError> {
        *REGISTRATION.get_or_init(|| {
            let commands = sys_membarrier(MEMBARRIER_CMD_QUERY);
            if commands < 0
                || commands & libc::c_long::from(MEMBARRIER_CMD_PRIVATE_EXPEDITED) == 0
                || commands & libc::c_long::from(MEMBARRIER_CMD_REGISTER_PRIVATE_EXPEDITED) == 0
            {
                return Err(RcuInitError::MembarrierUnsupported);
            }
            if sys_membarrier(MEMBARRIER_CMD_REGISTER_PRIVATE_EXPEDITED) != 0 {
                let errno = std::io::Error::last_os_error().raw_os_error().unwrap_or(0);
                return Err(RcuInitError::MembarrierRegister { errno });
            }
            Ok(())
        })
    }

    #[inline]
    pub(super) fn heavy() {
        let rc = sys_membarrier(MEMBARRIER_CMD_PRIVATE_EXPEDITED);
        assert_eq!(rc, 0, "expedited membarrier failed; was the process registered?");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_is_idempotent() {
        assert_eq!(register(), register());
    }

    #[test]
    fn heavy_fence_runs_after_registration() {
        register().expect("host must support the heavy fence");
        heavy();
        heavy();
    }

    #[test]
    fn light_fence_is_callable_anywhere() {
        light();
    }
}
