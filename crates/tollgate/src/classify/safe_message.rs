// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use serde::{Deserialize, Serialize};

use super::ErrorCategory;

/// Language of the end-user facing failure messages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub enum Locale {
    /// Thai, the language of the storefront the layer was first deployed for.
    #[default]
    Thai,

    /// English.
    English,
}

/// Returns a non-technical message for a failure category, suitable for end users.
///
/// The message never contains provider error codes, trace IDs or any other detail of the
/// underlying failure.
#[must_use]
pub const fn safe_message(category: ErrorCategory, locale: Locale) -> &'static str {
    match locale {
        Locale::Thai => thai(category),
        Locale::English => english(category),
    }
}

const fn thai(category: ErrorCategory) -> &'static str {
    match category {
        ErrorCategory::Authentication => "ระบบกำลังปรับปรุง กรุณาลองใหม่ภายหลังค่ะ",
        ErrorCategory::RateLimit => "กรุณารอสักครู่แล้วลองใหม่อีกครั้งนะคะ",
        ErrorCategory::Transient => "ระบบชั่วคราวไม่พร้อมใช้งาน กรุณารอสักครู่ค่ะ",
        ErrorCategory::Network => "อินเทอร์เน็ตไม่เสถียร กรุณาลองใหม่ค่ะ",
        ErrorCategory::Server => "ระบบกำลังปรับปรุง กรุณาลองใหม่ในอีกสักครู่นะคะ",
        ErrorCategory::Client => "ข้อมูลไม่ถูกต้อง กรุณาตรวจสอบอีกครั้งค่ะ",
        ErrorCategory::Unknown => "ขออภัยค่ะ มีข้อผิดพลาดเกิดขึ้น กรุณาลองใหม่",
    }
}

const fn english(category: ErrorCategory) -> &'static str {
    match category {
        ErrorCategory::Authentication => "The service is under maintenance. Please try again later.",
        ErrorCategory::RateLimit => "Please wait a moment and try again.",
        ErrorCategory::Transient => "The service is temporarily unavailable. Please wait a moment.",
        ErrorCategory::Network => "The connection is unstable. Please try again.",
        ErrorCategory::Server => "The service is being updated. Please try again shortly.",
        ErrorCategory::Client => "The request could not be processed. Please check it and try again.",
        ErrorCategory::Unknown => "Sorry, something went wrong. Please try again.",
    }
}
