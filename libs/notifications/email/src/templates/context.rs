//! Template data builders.
//!
//! Each builder validates its payload, serializes it and adds the `brand`
//! object (plus derived values such as the enrollment `program`).

use serde::Serialize;
use serde_json::{json, Value};
use validator::Validate;

use super::programs::program_info;
use crate::config::BrandingConfig;
use crate::error::{EmailError, EmailResult};
use crate::models::{ContactFormData, DroneInquiryData, EnrollmentData, NewsletterData};

fn with_brand<T: Serialize>(payload: &T, brand: &BrandingConfig) -> EmailResult<Value> {
    let mut value = serde_json::to_value(payload)
        .map_err(|e| EmailError::InvalidTemplateInput(e.to_string()))?;

    let map = value.as_object_mut().ok_or_else(|| {
        EmailError::InvalidTemplateInput("template payload must serialize to an object".into())
    })?;
    map.insert("brand".to_string(), json!(brand));

    Ok(value)
}

pub fn contact(form: &ContactFormData, brand: &BrandingConfig) -> EmailResult<Value> {
    form.validate()?;
    with_brand(form, brand)
}

pub fn drone_inquiry(form: &DroneInquiryData, brand: &BrandingConfig) -> EmailResult<Value> {
    form.validate()?;
    with_brand(form, brand)
}

pub fn enrollment(form: &EnrollmentData, brand: &BrandingConfig) -> EmailResult<Value> {
    form.validate()?;
    let mut value = with_brand(form, brand)?;
    if let Some(map) = value.as_object_mut() {
        map.insert("program".to_string(), json!(program_info(&form.program_id)));
    }
    Ok(value)
}

pub fn newsletter(
    form: &NewsletterData,
    confirmation_url: &str,
    brand: &BrandingConfig,
) -> EmailResult<Value> {
    form.validate()?;
    let mut value = with_brand(form, brand)?;
    if let Some(map) = value.as_object_mut() {
        map.insert("confirmation_url".to_string(), json!(confirmation_url));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enrollment_form(program_id: &str) -> EnrollmentData {
        EnrollmentData {
            name: "Sam".to_string(),
            email: "sam@example.com".to_string(),
            phone: None,
            program_id: program_id.to_string(),
            preferred_start: None,
            experience_level: Some("beginner".to_string()),
            message: None,
        }
    }

    #[test]
    fn test_context_carries_brand() {
        let form = ContactFormData {
            name: "Jane".to_string(),
            email: "jane@example.com".to_string(),
            phone: None,
            company: None,
            subject: None,
            service: None,
            message: "Hi".to_string(),
        };

        let value = contact(&form, &BrandingConfig::default()).unwrap();
        assert_eq!(value["brand"]["company_name"], "Aero Drone Services");
        assert_eq!(value["name"], "Jane");
    }

    #[test]
    fn test_enrollment_embeds_program_defaults() {
        let value = enrollment(&enrollment_form("unknown-program"), &BrandingConfig::default())
            .unwrap();
        assert_eq!(value["program"]["name"], "unknown-program");
        assert_eq!(value["program"]["duration"], "TBD");
        assert_eq!(value["program"]["price"], "Contact for pricing");
        assert_eq!(value["program"]["requirements"], json!([]));
    }

    #[test]
    fn test_invalid_payload_is_rejected() {
        let form = NewsletterData {
            email: "not-an-email".to_string(),
            name: None,
            interests: vec![],
        };
        let err = newsletter(&form, "https://x.example/confirm", &BrandingConfig::default())
            .unwrap_err();
        assert!(matches!(err, EmailError::InvalidTemplateInput(_)));
    }
}
