//! CATapDescription Bindings (macOS 14.4+)
//!
//! CATapDescription is the Objective-C class AudioHardwareCreateProcessTap
//! expects; it inherits from NSObject and is passed as a CFTypeRef.
//!
//! `initStereoMixdownOfProcesses:` takes AudioObjectIDs, not PIDs, so each
//! PID is first translated through
//! `kAudioHardwarePropertyTranslatePIDToProcessObject`. The translation only
//! succeeds for processes currently using audio.

use objc2::msg_send;
use objc2::rc::Retained;
use objc2::runtime::{AnyClass, NSObject};
use objc2_foundation::{NSArray, NSNumber};
use tracing::{debug, warn};

use coreaudio_sys::{
    kAudioObjectPropertyElementMain, kAudioObjectPropertyScopeGlobal, kAudioObjectSystemObject,
    AudioObjectGetPropertyData, AudioObjectID, AudioObjectPropertyAddress,
};

/// kAudioHardwarePropertyTranslatePIDToProcessObject
const TRANSLATE_PID_TO_PROCESS_OBJECT: u32 = 0x6964_3270; // 'id2p'

/// Raw pointer type handed to AudioHardwareCreateProcessTap
pub type TapDescriptionRef = *const std::ffi::c_void;

/// Owned CATapDescription configured for one process's stereo mixdown
pub struct TapDescription {
    inner: Retained<NSObject>,
}

// The description is created, configured, and handed to CoreAudio; it is
// never mutated concurrently after that.
unsafe impl Send for TapDescription {}
unsafe impl Sync for TapDescription {}

fn translate_pid_to_audio_object(pid: i32) -> Option<AudioObjectID> {
    unsafe {
        let address = AudioObjectPropertyAddress {
            mSelector: TRANSLATE_PID_TO_PROCESS_OBJECT,
            mScope: kAudioObjectPropertyScopeGlobal,
            mElement: kAudioObjectPropertyElementMain,
        };

        let mut object_id: AudioObjectID = 0;
        let mut data_size = std::mem::size_of::<AudioObjectID>() as u32;
        let status = AudioObjectGetPropertyData(
            kAudioObjectSystemObject,
            &address,
            std::mem::size_of::<i32>() as u32,
            &pid as *const i32 as *const _,
            &mut data_size,
            &mut object_id as *mut AudioObjectID as *mut _,
        );

        if status != 0 || object_id == 0 {
            warn!(pid, status, "PID has no audio process object");
            return None;
        }
        debug!(pid, object_id, "translated PID to audio object");
        Some(object_id)
    }
}

impl TapDescription {
    /// Build a stereo-mixdown tap description for one process.
    ///
    /// Returns None when the class is unavailable (macOS < 14.4) or the
    /// process is not currently using audio.
    pub fn for_process(pid: i32) -> Option<Self> {
        unsafe {
            let tap_class = match AnyClass::get(c"CATapDescription") {
                Some(class) => class,
                None => {
                    warn!("CATapDescription class not found - macOS 14.4+ required");
                    return None;
                }
            };

            let object_id = translate_pid_to_audio_object(pid)?;
            let numbers = [NSNumber::new_u32(object_id)];
            let object_ids = NSArray::from_retained_slice(&numbers);

            let alloc: *mut NSObject = msg_send![tap_class, alloc];
            if alloc.is_null() {
                warn!("failed to allocate CATapDescription");
                return None;
            }

            let obj: *mut NSObject = msg_send![alloc, initStereoMixdownOfProcesses: &*object_ids];
            if obj.is_null() {
                warn!(pid, "initStereoMixdownOfProcesses: returned nil");
                return None;
            }

            // A UUID is required before the description is usable in an
            // aggregate; the definitive UID is still read back from the
            // created tap afterwards.
            if let Some(uuid_class) = AnyClass::get(c"NSUUID") {
                let ns_uuid: *mut NSObject = msg_send![uuid_class, UUID];
                if !ns_uuid.is_null() {
                    let _: () = msg_send![obj, setUUID: ns_uuid];
                }
            }

            let inner = Retained::from_raw(obj)?;
            debug!(pid, "CATapDescription created");
            Some(Self { inner })
        }
    }

    /// Mute the process's direct output so audio only plays through the
    /// aggregate path. Without this the original signal leaks to the
    /// speakers alongside the processed one.
    pub fn set_mute(&self, mute: bool) {
        unsafe {
            // muteBehavior is declared 'q' (long long)
            let behavior: i64 = if mute { 1 } else { 0 };
            let _: () = msg_send![&*self.inner, setMuteBehavior: behavior];
        }
    }

    /// Hide the tap from other applications
    pub fn set_private(&self, private: bool) {
        unsafe {
            let _: () = msg_send![&*self.inner, setPrivate: private];
        }
    }

    /// Raw pointer for AudioHardwareCreateProcessTap
    pub fn as_ptr(&self) -> TapDescriptionRef {
        Retained::as_ptr(&self.inner) as TapDescriptionRef
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_lookup_does_not_crash() {
        // Present on macOS 14.4+, absent on older systems; either is fine.
        let _ = AnyClass::get(c"CATapDescription");
    }
}
