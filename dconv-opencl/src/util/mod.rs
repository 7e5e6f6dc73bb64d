use crate::error::Error;
use opencl3::command_queue::CommandQueue;
use opencl3::context::Context;
use opencl3::device::{get_all_devices, Device, CL_DEVICE_TYPE_GPU};
use opencl3::kernel::Kernel;
use opencl3::program::Program;

#[macro_export]
macro_rules! wrap_cl_error {
    ($res: expr, $($arg:tt)*) => {
        ($res).map_err(|err| $crate::error::Error::from_cl_err(err, format!($($arg)*)))
    }
}
pub(crate) use wrap_cl_error;

macro_rules! validate {
    ($cond:expr) => {
        if !$cond {
            return Err($crate::error::Error::ValidationError(
                concat!("Validation failed (condition: ", stringify!($cond), ")").to_string(),
            ));
        }
    };
    ($cond:expr, $msg: literal) => {
        if !$cond {
            return Err($crate::error::Error::ValidationError(
                concat!("Validation failed: ", $msg, " (condition: ", stringify!($cond), ")").to_string(),
            ));
        }
    };
}
pub(crate) use validate;

pub type Result<T> = std::result::Result<T, Error>;

pub fn get_default_device() -> Result<Device> {
    let device_id = *get_all_devices(CL_DEVICE_TYPE_GPU)
        .map_err(|err| Error::from_cl_err(err, "Failed to enumerate devices"))?
        .first()
        .ok_or(Error::NoDevicesFound)?;
    Ok(Device::new(device_id))
}

pub fn get_context(device: &Device) -> Result<Context> {
    wrap_cl_error!(Context::from_device(device), "Failed to get context")
}

pub fn create_program(context: &Context, source: &str, options: &str) -> Result<Program> {
    Program::create_and_build_from_source(context, source, options).map_err(Error::CreateProgramError)
}

pub fn create_kernel(program: &Program, name: &str) -> Result<Kernel> {
    wrap_cl_error!(Kernel::create(program, name), "Failed to create kernel: {name}")
}

/// An in-order queue, so commands enqueued on it observe each other's results.
pub fn create_queue(context: &Context) -> Result<CommandQueue> {
    #[allow(deprecated)]
    let queue = CommandQueue::create_default(context, 0);
    wrap_cl_error!(queue, "Failed to create queue")
}

#[inline]
pub(crate) const fn next_multiple(n: usize, of: usize) -> usize {
    let rem = n % of;
    if rem == 0 {
        n
    } else {
        n + (of - rem)
    }
}

#[inline]
pub(crate) fn to_uint(value: usize) -> Result<u32> {
    u32::try_from(value).map_err(|_| Error::ValidationError(format!("{value} does not fit a kernel argument")))
}

#[cfg(test)]
#[allow(unused)]
pub struct TestContext {
    pub device: Device,
    pub context: Context,
    pub queue: CommandQueue,
}

#[cfg(test)]
pub fn create_test_context() -> Result<TestContext> {
    let device = get_default_device()?;
    let context = get_context(&device)?;
    let queue = create_queue(&context)?;
    Ok(TestContext { device, context, queue })
}

#[cfg(test)]
mod test {
    use super::{next_multiple, to_uint};

    #[test]
    fn test_next_multiple() {
        assert_eq!(next_multiple(16, 8), 16);
        assert_eq!(next_multiple(17, 8), 24);
        assert_eq!(next_multiple(1, 8), 8);
    }

    #[test]
    fn test_to_uint() {
        assert_eq!(to_uint(17).unwrap(), 17);
        assert!(to_uint(usize::MAX).is_err());
    }
}
