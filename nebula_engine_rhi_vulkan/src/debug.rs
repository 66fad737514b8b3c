/// Vulkan debug messenger - routes validation layer messages into the engine log

use ash::vk;
use nebula_engine::{engine_debug, engine_error, engine_info, engine_warn};
use std::ffi::CStr;

/// Check whether an instance layer is available before requesting it
pub(crate) fn is_validation_layer_available(entry: &ash::Entry, layer_name: &CStr) -> bool {
    let layers = unsafe { entry.enumerate_instance_layer_properties() }.unwrap_or_default();
    layers.iter().any(|layer| {
        let name = unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) };
        name == layer_name
    })
}

/// Messenger callback: forwards messages at the matching engine severity
pub(crate) unsafe extern "system" fn vulkan_debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::os::raw::c_void,
) -> vk::Bool32 {
    let message = if callback_data.is_null() || (*callback_data).p_message.is_null() {
        std::borrow::Cow::Borrowed("<no message>")
    } else {
        CStr::from_ptr((*callback_data).p_message).to_string_lossy()
    };

    if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        engine_error!("nebula::vulkan", "[validation] {}", message);
    } else if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        engine_warn!("nebula::vulkan", "[validation] {}", message);
    } else if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        engine_info!("nebula::vulkan", "[validation] {}", message);
    } else {
        engine_debug!("nebula::vulkan", "[validation] {}", message);
    }

    vk::FALSE
}

/// Create-info used both for the instance pNext chain and the live messenger
pub(crate) fn messenger_create_info<'a>() -> vk::DebugUtilsMessengerCreateInfoEXT<'a> {
    vk::DebugUtilsMessengerCreateInfoEXT::default()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(vulkan_debug_callback))
}
