//! Parallel-port trigger output through the Linux ppdev interface.

use crate::error::HardwareError;
use crate::trigger::TriggerSink;
use std::path::Path;

#[cfg(target_os = "linux")]
mod imp {
    use super::*;
    use std::fs::{File, OpenOptions};
    use std::io;
    use std::os::unix::io::AsRawFd;
    use std::path::PathBuf;

    // _IO('p', 0x8b), _IO('p', 0x8c), _IOW('p', 0x86, unsigned char)
    const PPCLAIM: u32 = 0x708B;
    const PPRELEASE: u32 = 0x708C;
    const PPWDATA: u32 = 0x4001_7086;

    pub struct ParallelPort {
        file: File,
        device: PathBuf,
    }

    impl ParallelPort {
        /// Opens and claims the port, then lowers all data lines.
        pub fn open(device: &Path) -> Result<Self, HardwareError> {
            let unavailable = |source| HardwareError::Unavailable {
                device: device.to_path_buf(),
                source,
            };
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .open(device)
                .map_err(unavailable)?;

            // SAFETY: fd is valid for the lifetime of `file`; PPCLAIM takes no argument.
            let rc = unsafe { libc::ioctl(file.as_raw_fd(), PPCLAIM as _) };
            if rc < 0 {
                return Err(unavailable(io::Error::last_os_error()));
            }

            let mut port = Self {
                file,
                device: device.to_path_buf(),
            };
            port.write_data(0)?;
            Ok(port)
        }

        pub fn device(&self) -> &Path {
            &self.device
        }

        fn write_data(&mut self, code: u8) -> Result<(), HardwareError> {
            let value: libc::c_uchar = code;
            // SAFETY: PPWDATA reads one unsigned char through the pointer.
            let rc = unsafe {
                libc::ioctl(
                    self.file.as_raw_fd(),
                    PPWDATA as _,
                    &value as *const libc::c_uchar,
                )
            };
            if rc < 0 {
                return Err(HardwareError::Write {
                    code,
                    source: io::Error::last_os_error(),
                });
            }
            Ok(())
        }
    }

    impl TriggerSink for ParallelPort {
        fn emit(&mut self, code: u8) -> Result<(), HardwareError> {
            self.write_data(code)
        }

        fn reset(&mut self) -> Result<(), HardwareError> {
            self.write_data(0)
        }
    }

    impl Drop for ParallelPort {
        fn drop(&mut self) {
            let _ = self.write_data(0);
            // SAFETY: releasing a port we claimed in `open`.
            unsafe {
                libc::ioctl(self.file.as_raw_fd(), PPRELEASE as _);
            }
        }
    }
}

#[cfg(not(target_os = "linux"))]
mod imp {
    use super::*;
    use std::convert::Infallible;

    pub struct ParallelPort {
        never: Infallible,
    }

    impl ParallelPort {
        pub fn open(_device: &Path) -> Result<Self, HardwareError> {
            Err(HardwareError::Unsupported(
                "parallel port output requires Linux ppdev",
            ))
        }

        pub fn device(&self) -> &Path {
            let never: Infallible = self.never;
            match never {}
        }
    }

    impl TriggerSink for ParallelPort {
        fn emit(&mut self, _code: u8) -> Result<(), HardwareError> {
            let never: Infallible = self.never;
            match never {}
        }

        fn reset(&mut self) -> Result<(), HardwareError> {
            let never: Infallible = self.never;
            match never {}
        }
    }
}

pub use imp::ParallelPort;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_device_is_an_error() {
        let err = ParallelPort::open(Path::new("/nonexistent/parport-test"))
            .err()
            .unwrap();
        assert!(matches!(
            err,
            HardwareError::Unavailable { .. } | HardwareError::Unsupported(_)
        ));
    }
}
