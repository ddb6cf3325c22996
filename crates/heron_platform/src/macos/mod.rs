//! CoreAudio TapHost (macOS 14.4+)
//!
//! Real [`TapHost`] implementation over the Process Tap API: taps are
//! created from a CATapDescription, bound to the target output through a
//! private aggregate device, and serviced by an IO proc that hands each
//! input buffer to the engine callback before mirroring it to the output.

mod ffi;
mod tap_description;

use std::collections::HashMap;
use std::ffi::c_void;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::PlatformError;
use crate::host::{AggregateId, DeviceTarget, IoCallback, IoProcId, TapDescriptor, TapHost, TapId};

use ffi::{AudioBufferList, AudioDeviceID, AudioDeviceIOProcID, AudioTimeStamp};
use tap_description::TapDescription;

/// Raw IO proc identifier, safe to move between threads
struct IoProcHandle(AudioDeviceIOProcID);

unsafe impl Send for IoProcHandle {}

/// Heap context handed to the HAL; freed only after the proc is destroyed
struct ContextHandle(*mut CallbackContext);

unsafe impl Send for ContextHandle {}

struct CallbackContext {
    callback: IoCallback,
    sample_rate: f64,
}

struct Registration {
    device: AudioDeviceID,
    proc_id: IoProcHandle,
    context: ContextHandle,
}

/// TapHost backed by CoreAudio process taps
#[derive(Default)]
pub struct CoreAudioTapHost {
    registrations: Mutex<HashMap<u64, Registration>>,
    // CATapDescription objects must outlive their taps.
    descriptions: Mutex<HashMap<u32, TapDescription>>,
    next_io_proc: AtomicU64,
}

impl CoreAudioTapHost {
    pub fn new() -> Self {
        Self::default()
    }
}

/// IO proc trampoline. Runs on the HAL's real-time thread: no allocation,
/// no locks, no logging.
extern "C" fn host_io_proc(
    _in_device: AudioDeviceID,
    _in_now: *const AudioTimeStamp,
    in_input_data: *const AudioBufferList,
    _in_input_time: *const AudioTimeStamp,
    out_output_data: *mut AudioBufferList,
    _in_output_time: *const AudioTimeStamp,
    in_client_data: *mut c_void,
) -> i32 {
    if in_client_data.is_null() || in_input_data.is_null() {
        return 0;
    }

    unsafe {
        // The HAL serializes invocations of a single proc, so the mutable
        // borrow of the context is exclusive.
        let context = &mut *(in_client_data as *mut CallbackContext);
        let input_list = &*in_input_data;
        if input_list.mNumberBuffers == 0 {
            return 0;
        }

        let input = ffi::read_buffer(in_input_data, 0);
        if input.mData.is_null() || input.mDataByteSize == 0 {
            return 0;
        }

        let sample_count = input.mDataByteSize as usize / std::mem::size_of::<f32>();
        let samples = std::slice::from_raw_parts_mut(input.mData as *mut f32, sample_count);
        (context.callback)(samples, context.sample_rate);

        // Mirror the processed tap signal into the output sub-device.
        if !out_output_data.is_null() {
            let output_list = &*out_output_data;
            for index in 0..output_list.mNumberBuffers {
                let output = ffi::read_buffer(out_output_data, index);
                if output.mData.is_null() || output.mDataByteSize == 0 {
                    continue;
                }
                let out_count = output.mDataByteSize as usize / std::mem::size_of::<f32>();
                let out_samples =
                    std::slice::from_raw_parts_mut(output.mData as *mut f32, out_count);
                let len = out_count.min(sample_count);
                out_samples[..len].copy_from_slice(&samples[..len]);
                for sample in &mut out_samples[len..] {
                    *sample = 0.0;
                }
            }
        }
    }

    0
}

impl TapHost for CoreAudioTapHost {
    fn create_process_tap(&self, pid: u32) -> Result<(TapId, TapDescriptor), PlatformError> {
        let description = TapDescription::for_process(pid as i32)
            .ok_or(PlatformError::ProcessNotFound(pid))?;
        description.set_mute(true);
        description.set_private(true);

        let mut tap_id: u32 = 0;
        let status =
            unsafe { ffi::AudioHardwareCreateProcessTap(description.as_ptr(), &mut tap_id) };
        if status != 0 {
            return Err(PlatformError::TapCreationFailed(format!(
                "OSStatus {status}{} (pid {pid})",
                ffi::osstatus_hint(status)
            )));
        }

        // The aggregate must reference the UID the system assigned, not the
        // UUID we set on the description.
        let uid = match unsafe { ffi::get_tap_uid(tap_id) } {
            Some(uid) => uid,
            None => {
                unsafe { ffi::AudioHardwareDestroyProcessTap(tap_id) };
                return Err(PlatformError::TapCreationFailed(
                    "tap created but its UID could not be read".into(),
                ));
            }
        };

        self.descriptions.lock().insert(tap_id, description);
        debug!(pid, tap_id, uid = %uid, "process tap created");
        Ok((TapId(tap_id), TapDescriptor { uid }))
    }

    fn destroy_process_tap(&self, tap: TapId) -> Result<(), PlatformError> {
        let status = unsafe { ffi::AudioHardwareDestroyProcessTap(tap.0) };
        self.descriptions.lock().remove(&tap.0);
        if status != 0 {
            return Err(PlatformError::Internal(format!(
                "AudioHardwareDestroyProcessTap failed: OSStatus {status}"
            )));
        }
        Ok(())
    }

    fn create_aggregate_device(
        &self,
        descriptor: &TapDescriptor,
        target: &DeviceTarget,
        name: &str,
    ) -> Result<AggregateId, PlatformError> {
        let output_uid = match target {
            DeviceTarget::Uid(uid) => uid.clone(),
            DeviceTarget::SystemDefault => unsafe {
                let device = ffi::get_default_output_device()
                    .ok_or_else(|| PlatformError::DeviceNotFound("system default output".into()))?;
                ffi::get_device_uid(device).ok_or_else(|| {
                    PlatformError::DeviceNotFound(format!("UID of default output {device}"))
                })?
            },
        };

        let mut device_id: AudioDeviceID = 0;
        let status = unsafe {
            let dict = ffi::create_aggregate_device_description(&descriptor.uid, &output_uid, name);
            if dict.is_null() {
                return Err(PlatformError::AggregateCreationFailed(
                    "description dictionary allocation failed".into(),
                ));
            }
            let status = ffi::AudioHardwareCreateAggregateDevice(dict, &mut device_id);
            ffi::CFRelease(dict as ffi::CFTypeRef);
            status
        };
        if status != 0 {
            return Err(PlatformError::AggregateCreationFailed(format!(
                "OSStatus {status}{}",
                ffi::osstatus_hint(status)
            )));
        }

        debug!(device_id, output_uid = %output_uid, "aggregate device created");
        Ok(AggregateId(device_id))
    }

    fn destroy_aggregate_device(&self, device: AggregateId) -> Result<(), PlatformError> {
        let status = unsafe { ffi::AudioHardwareDestroyAggregateDevice(device.0) };
        if status != 0 {
            return Err(PlatformError::Internal(format!(
                "AudioHardwareDestroyAggregateDevice failed: OSStatus {status}"
            )));
        }
        Ok(())
    }

    fn register_io_callback(
        &self,
        device: AggregateId,
        callback: IoCallback,
    ) -> Result<IoProcId, PlatformError> {
        let sample_rate =
            unsafe { ffi::get_device_nominal_sample_rate(device.0) }.unwrap_or(48000.0);
        let context = Box::into_raw(Box::new(CallbackContext {
            callback,
            sample_rate,
        }));

        let mut proc_id: AudioDeviceIOProcID = std::ptr::null_mut();
        let status = unsafe {
            ffi::AudioDeviceCreateIOProcID(device.0, host_io_proc, context as *mut c_void, &mut proc_id)
        };
        if status != 0 {
            // The HAL never saw the context; reclaim it.
            unsafe { drop(Box::from_raw(context)) };
            return Err(PlatformError::IoProcFailed(format!(
                "AudioDeviceCreateIOProcID failed: OSStatus {status}"
            )));
        }

        let token = self.next_io_proc.fetch_add(1, Ordering::Relaxed) + 1;
        self.registrations.lock().insert(
            token,
            Registration {
                device: device.0,
                proc_id: IoProcHandle(proc_id),
                context: ContextHandle(context),
            },
        );
        debug!(device = device.0, token, sample_rate, "io proc registered");
        Ok(IoProcId(token))
    }

    fn unregister_io_callback(
        &self,
        _device: AggregateId,
        io_proc: IoProcId,
    ) -> Result<(), PlatformError> {
        let registration = self.registrations.lock().remove(&io_proc.0).ok_or_else(|| {
            PlatformError::IoProcFailed(format!("unknown io proc token {}", io_proc.0))
        })?;

        // Blocks until any in-flight invocation has returned.
        let status = unsafe {
            ffi::AudioDeviceDestroyIOProcID(registration.device, registration.proc_id.0)
        };
        if status != 0 {
            // The HAL may still reference the context; leaking it beats a
            // use-after-free on the audio thread.
            warn!(
                device = registration.device,
                status, "AudioDeviceDestroyIOProcID failed, leaking callback context"
            );
            return Err(PlatformError::IoProcFailed(format!(
                "AudioDeviceDestroyIOProcID failed: OSStatus {status}"
            )));
        }

        unsafe { drop(Box::from_raw(registration.context.0)) };
        Ok(())
    }

    fn start(&self, device: AggregateId, io_proc: IoProcId) -> Result<(), PlatformError> {
        let registrations = self.registrations.lock();
        let registration = registrations.get(&io_proc.0).ok_or_else(|| {
            PlatformError::IoProcFailed(format!("unknown io proc token {}", io_proc.0))
        })?;
        let status = unsafe { ffi::AudioDeviceStart(device.0, registration.proc_id.0) };
        if status != 0 {
            return Err(PlatformError::Internal(format!(
                "AudioDeviceStart failed: OSStatus {status}"
            )));
        }
        Ok(())
    }

    fn stop(&self, device: AggregateId, io_proc: IoProcId) -> Result<(), PlatformError> {
        let registrations = self.registrations.lock();
        let registration = registrations.get(&io_proc.0).ok_or_else(|| {
            PlatformError::IoProcFailed(format!("unknown io proc token {}", io_proc.0))
        })?;
        let status = unsafe { ffi::AudioDeviceStop(device.0, registration.proc_id.0) };
        if status != 0 {
            return Err(PlatformError::Internal(format!(
                "AudioDeviceStop failed: OSStatus {status}"
            )));
        }
        Ok(())
    }
}
