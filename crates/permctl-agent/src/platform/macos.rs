//! macOS privacy-authorization (TCC) adapters.
//!
//! - Microphone: `AVCaptureDevice` class methods, with a completion block.
//! - Accessibility: `AXIsProcessTrusted[WithOptions]` (ApplicationServices).
//! - Input Monitoring: `IOHIDCheckAccess` / `IOHIDRequestAccess` (IOKit).
//! - Screen Capture: `CGPreflightScreenCaptureAccess` / `CGRequestScreenCaptureAccess`.

#![allow(unsafe_code)]

use std::ffi::c_void;
use std::sync::{Mutex, PoisonError};

use block2::{DynBlock, RcBlock};
use objc2::ffi::NSInteger;
use objc2::msg_send;
use objc2::runtime::{AnyClass, Bool};
use objc2_foundation::{NSDictionary, NSNumber, NSString};
use tracing::debug;

use permctl_core::{Error, PermissionKind, PermissionStatus};

use crate::grant::{ConsentPrimitive, ConsentReply};
use crate::probe::AuthorizationBackend;

#[link(name = "AVFoundation", kind = "framework")]
unsafe extern "C" {
    static AVMediaTypeAudio: &'static NSString;
}

#[link(name = "ApplicationServices", kind = "framework")]
unsafe extern "C" {
    fn AXIsProcessTrusted() -> u8;
    fn AXIsProcessTrustedWithOptions(options: *const c_void) -> u8;
}

#[link(name = "IOKit", kind = "framework")]
unsafe extern "C" {
    fn IOHIDCheckAccess(request_type: u32) -> u32;
    fn IOHIDRequestAccess(request_type: u32) -> bool;
}

#[link(name = "CoreGraphics", kind = "framework")]
unsafe extern "C" {
    fn CGPreflightScreenCaptureAccess() -> bool;
    fn CGRequestScreenCaptureAccess() -> bool;
}

/// `kIOHIDRequestTypeListenEvent`
const HID_REQUEST_LISTEN_EVENT: u32 = 1;

/// `AVAuthorizationStatus` to our status.
const fn av_status(raw: NSInteger) -> PermissionStatus {
    match raw {
        0 => PermissionStatus::NotDetermined,
        1 => PermissionStatus::Restricted,
        3 => PermissionStatus::Granted,
        _ => PermissionStatus::Denied,
    }
}

/// `IOHIDAccessType` to our status.
const fn hid_status(raw: u32) -> PermissionStatus {
    match raw {
        0 => PermissionStatus::Granted,
        2 => PermissionStatus::NotDetermined,
        _ => PermissionStatus::Denied,
    }
}

const fn trusted(flag: bool) -> PermissionStatus {
    if flag {
        PermissionStatus::Granted
    } else {
        PermissionStatus::Denied
    }
}

fn capture_device_class() -> permctl_core::Result<&'static AnyClass> {
    AnyClass::get(c"AVCaptureDevice").ok_or_else(|| Error::ProbeUnavailable {
        kind: PermissionKind::Microphone,
        reason: "AVCaptureDevice class not found".into(),
    })
}

fn audio_media_type() -> &'static NSString {
    // SAFETY: AVFoundation is linked and exports this constant string.
    unsafe { AVMediaTypeAudio }
}

/// Read-only TCC status checks.
#[derive(Debug, Default)]
pub struct MacosBackend;

impl AuthorizationBackend for MacosBackend {
    fn check(&self, kind: PermissionKind) -> permctl_core::Result<PermissionStatus> {
        let status = match kind {
            PermissionKind::Microphone => {
                let cls = capture_device_class()?;
                // SAFETY: +[AVCaptureDevice authorizationStatusForMediaType:]
                // takes an AVMediaType and returns AVAuthorizationStatus.
                let raw: NSInteger =
                    unsafe { msg_send![cls, authorizationStatusForMediaType: audio_media_type()] };
                av_status(raw)
            }
            // SAFETY: no arguments; reads the trust database only.
            PermissionKind::Accessibility => trusted(unsafe { AXIsProcessTrusted() } != 0),
            PermissionKind::InputMonitoring => {
                // SAFETY: plain value argument; never prompts.
                hid_status(unsafe { IOHIDCheckAccess(HID_REQUEST_LISTEN_EVENT) })
            }
            // SAFETY: no arguments; never prompts.
            PermissionKind::ScreenCapture => trusted(unsafe { CGPreflightScreenCaptureAccess() }),
        };
        debug!(kind = %kind, status = %status, "TCC status");
        Ok(status)
    }
}

/// `requestAccessForMediaType:completionHandler:`. The handler runs on an
/// arbitrary dispatch queue.
#[derive(Debug, Default)]
pub struct MicrophoneConsent;

impl ConsentPrimitive for MicrophoneConsent {
    fn trigger(&self, reply: ConsentReply) -> permctl_core::Result<()> {
        fn request(cls: &AnyClass, media: &NSString, handler: &DynBlock<dyn Fn(Bool) + 'static>) {
            // SAFETY: correctly typed void-returning block; AVFoundation
            // copies it and calls it at most once.
            unsafe {
                let _: () = msg_send![
                    cls,
                    requestAccessForMediaType: media,
                    completionHandler: handler
                ];
            }
        }

        let cls = capture_device_class()?;
        let slot = Mutex::new(Some(reply));
        let handler = RcBlock::new(move |granted: Bool| {
            let reply = slot.lock().unwrap_or_else(PoisonError::into_inner).take();
            if let Some(reply) = reply {
                reply.resolve(trusted(granted.as_bool()));
            }
        });
        request(cls, audio_media_type(), &handler);
        Ok(())
    }
}

/// Shows the "would like to control this computer" alert.
#[derive(Debug, Default)]
pub struct AccessibilityConsent;

impl ConsentPrimitive for AccessibilityConsent {
    fn trigger(&self, reply: ConsentReply) -> permctl_core::Result<()> {
        let key = NSString::from_str("AXTrustedCheckOptionPrompt");
        let value = NSNumber::new_bool(true);
        let options = NSDictionary::from_slices(&[&*key], &[&*value]);
        let options_ptr: *const NSDictionary<NSString, NSNumber> = &*options;
        // SAFETY: NSDictionary is toll-free bridged to CFDictionaryRef and
        // outlives the call.
        let flag = unsafe { AXIsProcessTrustedWithOptions(options_ptr.cast()) } != 0;
        reply.resolve(trusted(flag));
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InputMonitoringConsent;

impl ConsentPrimitive for InputMonitoringConsent {
    fn trigger(&self, reply: ConsentReply) -> permctl_core::Result<()> {
        // SAFETY: plain value argument; returns once the prompt is queued.
        let granted = unsafe { IOHIDRequestAccess(HID_REQUEST_LISTEN_EVENT) };
        reply.resolve(trusted(granted));
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct ScreenCaptureConsent;

impl ConsentPrimitive for ScreenCaptureConsent {
    fn trigger(&self, reply: ConsentReply) -> permctl_core::Result<()> {
        // SAFETY: no arguments; shows the system prompt on first call only.
        let granted = unsafe { CGRequestScreenCaptureAccess() };
        reply.resolve(trusted(granted));
        Ok(())
    }
}
