// SPDX-License-Identifier: CEPL-1.0
//! Validation-layer output, routed into a [`DiagnosticSink`] instead of stderr.

use ash::ext::debug_utils;
use ash::vk;
use std::ffi::{c_void, CStr};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::error::{RenderResult, VkResultExt};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Verbose,
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn from_flags(flags: vk::DebugUtilsMessageSeverityFlagsEXT) -> Self {
        use vk::DebugUtilsMessageSeverityFlagsEXT as F;
        if flags.contains(F::ERROR) {
            Severity::Error
        } else if flags.contains(F::WARNING) {
            Severity::Warning
        } else if flags.contains(F::INFO) {
            Severity::Info
        } else {
            Severity::Verbose
        }
    }
}

fn kind_name(types: vk::DebugUtilsMessageTypeFlagsEXT) -> &'static str {
    use vk::DebugUtilsMessageTypeFlagsEXT as T;
    if types.contains(T::VALIDATION) {
        "validation"
    } else if types.contains(T::PERFORMANCE) {
        "performance"
    } else {
        "general"
    }
}

/// Receives driver and validation-layer messages for the life of a device context.
///
/// Called from whatever thread the driver reports on.
pub trait DiagnosticSink: Send + Sync {
    fn message(&self, severity: Severity, kind: &str, text: &str);
}

/// Forwards to `tracing` at the matching level.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn message(&self, severity: Severity, kind: &str, text: &str) {
        match severity {
            Severity::Error => error!("[vulkan/{kind}] {text}"),
            Severity::Warning => warn!("[vulkan/{kind}] {text}"),
            Severity::Info => info!("[vulkan/{kind}] {text}"),
            Severity::Verbose => debug!("[vulkan/{kind}] {text}"),
        }
    }
}

unsafe extern "system" fn forward_to_sink(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    user: *mut c_void,
) -> vk::Bool32 {
    if data.is_null() || user.is_null() {
        return vk::FALSE;
    }
    // SAFETY: `user` points at the Arc boxed by `DebugMessenger`, which outlives the messenger.
    let sink = unsafe { &*(user as *const Arc<dyn DiagnosticSink>) };
    let p_message = unsafe { (*data).p_message };
    if p_message.is_null() {
        return vk::FALSE;
    }
    let text = unsafe { CStr::from_ptr(p_message) }.to_string_lossy();
    sink.message(Severity::from_flags(severity), kind_name(types), &text);
    vk::FALSE
}

pub(crate) struct DebugMessenger {
    loader: debug_utils::Instance,
    handle: vk::DebugUtilsMessengerEXT,
    // address handed to the driver as user data
    _sink: Box<Arc<dyn DiagnosticSink>>,
}

impl DebugMessenger {
    /// # Safety
    /// `instance` must have been created with `VK_EXT_debug_utils` enabled and
    /// must outlive the returned messenger.
    pub(crate) unsafe fn new(
        entry: &ash::Entry,
        instance: &ash::Instance,
        sink: Arc<dyn DiagnosticSink>,
    ) -> RenderResult<Self> {
        let loader = debug_utils::Instance::new(entry, instance);
        let sink = Box::new(sink);
        let ci = vk::DebugUtilsMessengerCreateInfoEXT {
            s_type: vk::StructureType::DEBUG_UTILS_MESSENGER_CREATE_INFO_EXT,
            message_severity: vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            message_type: vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            pfn_user_callback: Some(forward_to_sink),
            p_user_data: &*sink as *const Arc<dyn DiagnosticSink> as *mut c_void,
            ..Default::default()
        };
        let handle = unsafe { loader.create_debug_utils_messenger(&ci, None) }
            .during("create_debug_utils_messenger")?;
        Ok(DebugMessenger {
            loader,
            handle,
            _sink: sink,
        })
    }

    /// # Safety
    /// Must run before the owning instance is destroyed, and only once.
    pub(crate) unsafe fn destroy(&mut self) {
        unsafe { self.loader.destroy_debug_utils_messenger(self.handle, None) };
        self.handle = vk::DebugUtilsMessengerEXT::null();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<(Severity, String, String)>>);

    impl DiagnosticSink for Recorder {
        fn message(&self, severity: Severity, kind: &str, text: &str) {
            self.0
                .lock()
                .unwrap()
                .push((severity, kind.to_owned(), text.to_owned()));
        }
    }

    #[test]
    fn highest_severity_bit_wins() {
        use vk::DebugUtilsMessageSeverityFlagsEXT as F;
        assert_eq!(Severity::from_flags(F::VERBOSE), Severity::Verbose);
        assert_eq!(Severity::from_flags(F::INFO), Severity::Info);
        assert_eq!(Severity::from_flags(F::WARNING | F::INFO), Severity::Warning);
        assert_eq!(Severity::from_flags(F::ERROR | F::WARNING), Severity::Error);
    }

    #[test]
    fn callback_reaches_the_injected_sink() {
        let recorder = Arc::new(Recorder::default());
        let sink: Arc<dyn DiagnosticSink> = recorder.clone();
        let boxed = Box::new(sink);
        let text = c"vkCreateImage: extent is zero";
        let data = vk::DebugUtilsMessengerCallbackDataEXT {
            p_message: text.as_ptr(),
            ..Default::default()
        };

        let ret = unsafe {
            forward_to_sink(
                vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
                vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION,
                &data,
                &*boxed as *const Arc<dyn DiagnosticSink> as *mut c_void,
            )
        };

        assert_eq!(ret, vk::FALSE);
        let seen = recorder.0.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, Severity::Error);
        assert_eq!(seen[0].1, "validation");
        assert_eq!(seen[0].2, "vkCreateImage: extent is zero");
    }

    #[test]
    fn null_user_data_is_ignored() {
        let data = vk::DebugUtilsMessengerCallbackDataEXT::default();
        let ret = unsafe {
            forward_to_sink(
                vk::DebugUtilsMessageSeverityFlagsEXT::INFO,
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL,
                &data,
                std::ptr::null_mut(),
            )
        };
        assert_eq!(ret, vk::FALSE);
    }
}
