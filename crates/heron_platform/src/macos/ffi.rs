//! Process Tap API FFI Bindings (macOS 14.4+)
//!
//! Raw bindings for the `AudioHardwareCreateProcessTap` family introduced
//! in macOS 14.4 Sonoma, plus the CoreFoundation pieces needed to build the
//! aggregate-device description dictionary. Use the safe wrapper in
//! `macos::CoreAudioTapHost` instead of calling these directly.

#![allow(non_upper_case_globals)]
#![allow(non_snake_case)]
#![allow(dead_code)]

use std::ffi::c_void;

pub use coreaudio_sys::{
    kAudioObjectPropertyElementMain, kAudioObjectPropertyScopeGlobal, kAudioObjectSystemObject,
    AudioDeviceID, AudioObjectGetPropertyData, AudioObjectID, AudioObjectPropertyAddress,
    OSStatus,
};

// CoreFoundation types
pub type CFStringRef = *const c_void;
pub type CFDictionaryRef = *const c_void;
pub type CFMutableDictionaryRef = *mut c_void;
pub type CFMutableArrayRef = *mut c_void;
pub type CFTypeRef = *const c_void;
pub type CFIndex = isize;
pub type CFAllocatorRef = *const c_void;

pub type AudioHardwareTapID = AudioObjectID;

/// Tap property selectors
pub mod tap_properties {
    /// UID string of a created tap, read back with
    /// AudioObjectGetPropertyData. This is the UID the aggregate device's
    /// tap list must reference.
    pub const kAudioTapPropertyUID: u32 = 0x74756964; // 'tuid'
}

/// Hardware property selectors
pub mod hardware_properties {
    /// The system default output device
    pub const kAudioHardwarePropertyDefaultOutputDevice: u32 = 0x644F7574; // 'dOut'
}

/// Device property selectors
pub mod device_properties {
    /// Device UID string
    pub const kAudioDevicePropertyDeviceUID: u32 = 0x75696420; // 'uid '

    /// Nominal sample rate (Float64)
    pub const kAudioDevicePropertyNominalSampleRate: u32 = 0x6E737274; // 'nsrt'
}

/// Aggregate device dictionary keys
pub mod aggregate_keys {
    pub const UID_KEY: &str = "uid";
    pub const NAME_KEY: &str = "name";
    pub const MAIN_SUBDEVICE_KEY: &str = "master";
    pub const IS_PRIVATE_KEY: &str = "private";
    pub const SUB_DEVICE_LIST_KEY: &str = "subdevices";
    pub const TAP_LIST_KEY: &str = "taps";
    pub const TAP_AUTO_START_KEY: &str = "tapautostart";
}

/// Sub-device dictionary keys (entries of SUB_DEVICE_LIST_KEY)
pub mod sub_device_keys {
    pub const UID_KEY: &str = "uid";
}

/// Sub-tap dictionary keys (entries of TAP_LIST_KEY)
pub mod sub_tap_keys {
    pub const UID_KEY: &str = "uid";
    pub const DRIFT_COMPENSATION_KEY: &str = "drift";
}

#[link(name = "CoreFoundation", kind = "framework")]
extern "C" {
    pub static kCFAllocatorDefault: CFAllocatorRef;
    pub static kCFBooleanTrue: CFTypeRef;
    pub static kCFBooleanFalse: CFTypeRef;

    pub fn CFDictionaryCreateMutable(
        allocator: CFAllocatorRef,
        capacity: CFIndex,
        keyCallBacks: *const c_void,
        valueCallBacks: *const c_void,
    ) -> CFMutableDictionaryRef;

    pub fn CFDictionarySetValue(dict: CFMutableDictionaryRef, key: CFTypeRef, value: CFTypeRef);

    pub fn CFArrayCreateMutable(
        allocator: CFAllocatorRef,
        capacity: CFIndex,
        callBacks: *const c_void,
    ) -> CFMutableArrayRef;

    pub fn CFArrayAppendValue(array: CFMutableArrayRef, value: CFTypeRef);

    pub fn CFStringCreateWithCString(
        alloc: CFAllocatorRef,
        cStr: *const i8,
        encoding: u32,
    ) -> CFStringRef;

    pub fn CFRelease(cf: CFTypeRef);

    pub static kCFTypeDictionaryKeyCallBacks: c_void;
    pub static kCFTypeDictionaryValueCallBacks: c_void;
    pub static kCFTypeArrayCallBacks: c_void;
}

pub const kCFStringEncodingUTF8: u32 = 0x0800_0100;

// Available starting macOS 14.4.
#[link(name = "CoreAudio", kind = "framework")]
extern "C" {
    /// `inDescription` is a CATapDescription passed as CFTypeRef.
    pub fn AudioHardwareCreateProcessTap(
        inDescription: CFTypeRef,
        outTapID: *mut AudioHardwareTapID,
    ) -> OSStatus;

    pub fn AudioHardwareDestroyProcessTap(inTapID: AudioHardwareTapID) -> OSStatus;

    pub fn AudioHardwareCreateAggregateDevice(
        inDescription: CFDictionaryRef,
        outDeviceID: *mut AudioDeviceID,
    ) -> OSStatus;

    pub fn AudioHardwareDestroyAggregateDevice(inDeviceID: AudioDeviceID) -> OSStatus;

    pub fn AudioDeviceCreateIOProcID(
        inDevice: AudioDeviceID,
        inProc: AudioDeviceIOProc,
        inClientData: *mut c_void,
        outIOProcID: *mut AudioDeviceIOProcID,
    ) -> OSStatus;

    /// Blocks until any in-flight invocation of the IO proc returns.
    pub fn AudioDeviceDestroyIOProcID(
        inDevice: AudioDeviceID,
        inIOProcID: AudioDeviceIOProcID,
    ) -> OSStatus;

    pub fn AudioDeviceStart(inDevice: AudioDeviceID, inProcID: AudioDeviceIOProcID) -> OSStatus;

    pub fn AudioDeviceStop(inDevice: AudioDeviceID, inProcID: AudioDeviceIOProcID) -> OSStatus;
}

pub type AudioDeviceIOProcID = *mut c_void;

/// Audio IO proc callback type, called on the HAL's real-time thread
pub type AudioDeviceIOProc = extern "C" fn(
    inDevice: AudioDeviceID,
    inNow: *const AudioTimeStamp,
    inInputData: *const AudioBufferList,
    inInputTime: *const AudioTimeStamp,
    outOutputData: *mut AudioBufferList,
    inOutputTime: *const AudioTimeStamp,
    inClientData: *mut c_void,
) -> OSStatus;

/// Audio time stamp (simplified)
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct AudioTimeStamp {
    pub mSampleTime: f64,
    pub mHostTime: u64,
    pub mRateScalar: f64,
    pub mWordClockTime: u64,
    pub mSMPTETime: SMPTETime,
    pub mFlags: u32,
    pub mReserved: u32,
}

/// SMPTE time (simplified)
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct SMPTETime {
    pub mSubframes: i16,
    pub mSubframeDivisor: i16,
    pub mCounter: u32,
    pub mType: u32,
    pub mFlags: u32,
    pub mHours: i16,
    pub mMinutes: i16,
    pub mSeconds: i16,
    pub mFrames: i16,
}

/// Audio buffer list header; the buffers array follows it in memory
#[repr(C)]
pub struct AudioBufferList {
    pub mNumberBuffers: u32,
    // mBuffers: [AudioBuffer; N] follows, at offset 8 on 64-bit
}

/// Single audio buffer
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct AudioBuffer {
    pub mNumberChannels: u32,
    pub mDataByteSize: u32,
    pub mData: *mut c_void,
}

/// Read buffer `index` out of a buffer list.
///
/// On 64-bit the buffers array starts at offset 8 (4 bytes of header plus
/// 4 bytes of alignment padding), and each AudioBuffer occupies 16 bytes.
/// The HAL does not guarantee 8-byte alignment of the list itself, so the
/// fields are read unaligned.
///
/// # Safety
///
/// `list` must point to a valid AudioBufferList with more than `index`
/// buffers.
pub unsafe fn read_buffer(list: *const AudioBufferList, index: u32) -> AudioBuffer {
    let base = (list as *const u8).add(8 + index as usize * 16);
    AudioBuffer {
        mNumberChannels: std::ptr::read_unaligned(base as *const u32),
        mDataByteSize: std::ptr::read_unaligned(base.add(4) as *const u32),
        mData: std::ptr::read_unaligned(base.add(8) as *const *mut c_void),
    }
}

/// Create a CFString from a Rust string.
///
/// # Safety
///
/// Caller must CFRelease the returned string.
pub unsafe fn create_cf_string(s: &str) -> CFStringRef {
    let c_str = std::ffi::CString::new(s).unwrap_or_default();
    CFStringCreateWithCString(kCFAllocatorDefault, c_str.as_ptr(), kCFStringEncodingUTF8)
}

/// Convert a CFString to a Rust String without consuming the reference.
///
/// # Safety
///
/// `cf_string` must be a valid CFString reference or null.
pub unsafe fn cfstring_to_string(cf_string: CFStringRef) -> Option<String> {
    use core_foundation::base::TCFType;
    use core_foundation::string::CFString;

    if cf_string.is_null() {
        return None;
    }
    let cf_str = CFString::wrap_under_get_rule(cf_string as *const _);
    Some(cf_str.to_string())
}

/// Read the system-assigned UID of a created tap.
///
/// # Safety
///
/// Uses CoreAudio FFI calls; `tap_id` must be a live tap.
pub unsafe fn get_tap_uid(tap_id: AudioHardwareTapID) -> Option<String> {
    let address = AudioObjectPropertyAddress {
        mSelector: tap_properties::kAudioTapPropertyUID,
        mScope: kAudioObjectPropertyScopeGlobal,
        mElement: kAudioObjectPropertyElementMain,
    };

    let mut uid_ref: CFStringRef = std::ptr::null();
    let mut data_size = std::mem::size_of::<CFStringRef>() as u32;
    let status = AudioObjectGetPropertyData(
        tap_id,
        &address,
        0,
        std::ptr::null(),
        &mut data_size,
        &mut uid_ref as *mut CFStringRef as *mut _,
    );
    if status != 0 || uid_ref.is_null() {
        tracing::warn!(tap_id, status, "failed to read tap UID");
        return None;
    }

    let uid = cfstring_to_string(uid_ref);
    CFRelease(uid_ref);
    uid
}

/// Look up the system default output device.
///
/// # Safety
///
/// Uses CoreAudio FFI calls.
pub unsafe fn get_default_output_device() -> Option<AudioDeviceID> {
    let address = AudioObjectPropertyAddress {
        mSelector: hardware_properties::kAudioHardwarePropertyDefaultOutputDevice,
        mScope: kAudioObjectPropertyScopeGlobal,
        mElement: kAudioObjectPropertyElementMain,
    };

    let mut device: AudioDeviceID = 0;
    let mut data_size = std::mem::size_of::<AudioDeviceID>() as u32;
    let status = AudioObjectGetPropertyData(
        kAudioObjectSystemObject,
        &address,
        0,
        std::ptr::null(),
        &mut data_size,
        &mut device as *mut AudioDeviceID as *mut _,
    );
    if status != 0 || device == 0 {
        tracing::warn!(status, "failed to read default output device");
        return None;
    }
    Some(device)
}

/// Read a device's UID string.
///
/// # Safety
///
/// Uses CoreAudio FFI calls.
pub unsafe fn get_device_uid(device_id: AudioDeviceID) -> Option<String> {
    let address = AudioObjectPropertyAddress {
        mSelector: device_properties::kAudioDevicePropertyDeviceUID,
        mScope: kAudioObjectPropertyScopeGlobal,
        mElement: kAudioObjectPropertyElementMain,
    };

    let mut uid_ref: CFStringRef = std::ptr::null();
    let mut data_size = std::mem::size_of::<CFStringRef>() as u32;
    let status = AudioObjectGetPropertyData(
        device_id,
        &address,
        0,
        std::ptr::null(),
        &mut data_size,
        &mut uid_ref as *mut CFStringRef as *mut _,
    );
    if status != 0 || uid_ref.is_null() {
        tracing::warn!(device_id, status, "failed to read device UID");
        return None;
    }

    let uid = cfstring_to_string(uid_ref);
    CFRelease(uid_ref);
    uid
}

/// Read a device's nominal sample rate in Hz.
///
/// # Safety
///
/// Uses CoreAudio FFI calls.
pub unsafe fn get_device_nominal_sample_rate(device_id: AudioDeviceID) -> Option<f64> {
    let address = AudioObjectPropertyAddress {
        mSelector: device_properties::kAudioDevicePropertyNominalSampleRate,
        mScope: kAudioObjectPropertyScopeGlobal,
        mElement: kAudioObjectPropertyElementMain,
    };

    let mut rate: f64 = 0.0;
    let mut data_size = std::mem::size_of::<f64>() as u32;
    let status = AudioObjectGetPropertyData(
        device_id,
        &address,
        0,
        std::ptr::null(),
        &mut data_size,
        &mut rate as *mut f64 as *mut _,
    );
    if status != 0 || rate <= 0.0 {
        return None;
    }
    Some(rate)
}

/// Build the aggregate-device description binding a tap to an output.
///
/// Layout:
/// - the target output device is the main sub-device (and the only entry
///   in the sub-device list), so the aggregate plays through it
/// - the tap list carries the system-assigned tap UID with drift
///   compensation enabled
/// - private, so the device never shows up in Sound settings
/// - tapautostart, so capture begins as soon as the device runs
///
/// # Safety
///
/// Caller must CFRelease the returned dictionary.
pub unsafe fn create_aggregate_device_description(
    tap_uid: &str,
    output_uid: &str,
    name: &str,
) -> CFMutableDictionaryRef {
    let dict = CFDictionaryCreateMutable(
        kCFAllocatorDefault,
        0,
        &kCFTypeDictionaryKeyCallBacks,
        &kCFTypeDictionaryValueCallBacks,
    );

    let set_string = |dict: CFMutableDictionaryRef, key: &str, value: &str| {
        let cf_key = create_cf_string(key);
        let cf_value = create_cf_string(value);
        CFDictionarySetValue(dict, cf_key, cf_value);
        CFRelease(cf_key);
        CFRelease(cf_value);
    };
    let set_true = |dict: CFMutableDictionaryRef, key: &str| {
        let cf_key = create_cf_string(key);
        CFDictionarySetValue(dict, cf_key, kCFBooleanTrue);
        CFRelease(cf_key);
    };

    let aggregate_uid = format!("com.heron.aggregate.{}", uuid::Uuid::new_v4());
    set_string(dict, aggregate_keys::UID_KEY, &aggregate_uid);
    set_string(dict, aggregate_keys::NAME_KEY, name);
    set_string(dict, aggregate_keys::MAIN_SUBDEVICE_KEY, output_uid);
    set_true(dict, aggregate_keys::IS_PRIVATE_KEY);
    set_true(dict, aggregate_keys::TAP_AUTO_START_KEY);

    // Sub-device list: [ { "uid": "<output_uid>" } ]
    let subdevices = CFArrayCreateMutable(kCFAllocatorDefault, 1, &kCFTypeArrayCallBacks);
    let sub_dict = CFDictionaryCreateMutable(
        kCFAllocatorDefault,
        0,
        &kCFTypeDictionaryKeyCallBacks,
        &kCFTypeDictionaryValueCallBacks,
    );
    set_string(sub_dict, sub_device_keys::UID_KEY, output_uid);
    CFArrayAppendValue(subdevices, sub_dict as CFTypeRef);
    CFRelease(sub_dict as CFTypeRef);

    let subdevices_key = create_cf_string(aggregate_keys::SUB_DEVICE_LIST_KEY);
    CFDictionarySetValue(dict, subdevices_key, subdevices as CFTypeRef);
    CFRelease(subdevices_key);
    CFRelease(subdevices as CFTypeRef);

    // Tap list: [ { "uid": "<tap_uid>", "drift": true } ]
    let taps = CFArrayCreateMutable(kCFAllocatorDefault, 1, &kCFTypeArrayCallBacks);
    let tap_dict = CFDictionaryCreateMutable(
        kCFAllocatorDefault,
        0,
        &kCFTypeDictionaryKeyCallBacks,
        &kCFTypeDictionaryValueCallBacks,
    );
    set_string(tap_dict, sub_tap_keys::UID_KEY, tap_uid);
    set_true(tap_dict, sub_tap_keys::DRIFT_COMPENSATION_KEY);
    CFArrayAppendValue(taps, tap_dict as CFTypeRef);
    CFRelease(tap_dict as CFTypeRef);

    let taps_key = create_cf_string(aggregate_keys::TAP_LIST_KEY);
    CFDictionarySetValue(dict, taps_key, taps as CFTypeRef);
    CFRelease(taps_key);
    CFRelease(taps as CFTypeRef);

    tracing::debug!(name, tap_uid, output_uid, "aggregate device description built");
    dict
}

/// Human-readable hints for the OSStatus codes this API actually returns
pub fn osstatus_hint(status: OSStatus) -> &'static str {
    match status as u32 {
        0x7768_6F34 => " (who4: not authorized - check audio capture permissions)",
        0x7768_6174 => " (what: unspecified error, often permission related)",
        0x2170_7270 => " (!prp: bad property)",
        0x216F_626A => " (!obj: bad object)",
        0xFFFF_FFCE => " (-50: paramErr - invalid parameters or process not playing audio)",
        _ => "",
    }
}
