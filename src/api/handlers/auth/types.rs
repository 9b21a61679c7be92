//! Request/response types for auth endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    auth::{utils::valid_email, AuthError, FieldError, Role},
    store::{MfaMethod, UserProfile},
};

const MIN_PASSWORD_LEN: usize = 6;
const MIN_NEW_PASSWORD_LEN: usize = 8;
const MIN_CODE_LEN: usize = 6;
const TOTP_CODE_LEN: usize = 6;

fn finish(errors: Vec<FieldError>) -> Result<(), AuthError> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(AuthError::Validation(errors))
    }
}

fn check_email(errors: &mut Vec<FieldError>, email: &str) {
    if email.is_empty() {
        errors.push(FieldError::new("email", "Email is required"));
    } else if !valid_email(email) {
        errors.push(FieldError::new("email", "Invalid email format"));
    }
}

fn check_min(errors: &mut Vec<FieldError>, field: &str, value: &str, min: usize, message: &str) {
    if value.chars().count() < min {
        errors.push(FieldError::new(field, message));
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl LoginRequest {
    /// # Errors
    /// `Validation` listing every failed field.
    pub fn validate(&self) -> Result<(), AuthError> {
        let mut errors = Vec::new();
        check_email(&mut errors, &self.email);
        if self.password.is_empty() {
            errors.push(FieldError::new("password", "Password is required"));
        }
        finish(errors)
    }
}

/// Either a session or an MFA challenge.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(untagged)]
pub enum LoginResponse {
    Authenticated {
        token: String,
        #[serde(rename = "requiresMFA")]
        requires_mfa: bool,
        user: UserProfile,
    },
    MfaRequired {
        #[serde(rename = "requiresMFA")]
        requires_mfa: bool,
        #[serde(rename = "tempToken")]
        temp_token: String,
        #[serde(rename = "mfaMethod")]
        mfa_method: MfaMethod,
    },
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct VerifyMfaRequest {
    pub temp_token: String,
    pub token: String,
    pub method: MfaMethod,
}

impl VerifyMfaRequest {
    /// # Errors
    /// `Validation` listing every failed field.
    pub fn validate(&self) -> Result<(), AuthError> {
        let mut errors = Vec::new();
        if self.temp_token.is_empty() {
            errors.push(FieldError::new("tempToken", "Temporary token is required"));
        }
        check_min(
            &mut errors,
            "token",
            &self.token,
            MIN_CODE_LEN,
            "MFA token must be at least 6 characters",
        );
        finish(errors)
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SessionResponse {
    pub token: String,
    pub user: UserProfile,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
    pub phone: Option<String>,
    pub role: Role,
    pub organization_id: Option<i32>,
}

impl RegisterRequest {
    /// # Errors
    /// `Validation` listing every failed field.
    pub fn validate(&self) -> Result<(), AuthError> {
        let mut errors = Vec::new();
        check_email(&mut errors, &self.email);
        check_min(
            &mut errors,
            "password",
            &self.password,
            MIN_PASSWORD_LEN,
            "Password must be at least 6 characters",
        );
        if self.name.trim().is_empty() {
            errors.push(FieldError::new("name", "Name is required"));
        }
        finish(errors)
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RegisterResponse {
    pub message: String,
    pub user: UserProfile,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

impl ChangePasswordRequest {
    /// # Errors
    /// `Validation` listing every failed field.
    pub fn validate(&self) -> Result<(), AuthError> {
        let mut errors = Vec::new();
        check_min(
            &mut errors,
            "currentPassword",
            &self.current_password,
            MIN_PASSWORD_LEN,
            "Current password is required",
        );
        check_min(
            &mut errors,
            "newPassword",
            &self.new_password,
            MIN_NEW_PASSWORD_LEN,
            "New password must be at least 8 characters",
        );
        finish(errors)
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

impl ForgotPasswordRequest {
    /// # Errors
    /// `Validation` for a malformed email.
    pub fn validate(&self) -> Result<(), AuthError> {
        let mut errors = Vec::new();
        check_email(&mut errors, &self.email);
        finish(errors)
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub password: String,
}

impl ResetPasswordRequest {
    /// # Errors
    /// `Validation` listing every failed field.
    pub fn validate(&self) -> Result<(), AuthError> {
        let mut errors = Vec::new();
        if self.token.trim().is_empty() {
            errors.push(FieldError::new("token", "Token is required"));
        }
        check_min(
            &mut errors,
            "password",
            &self.password,
            MIN_NEW_PASSWORD_LEN,
            "Password must be at least 8 characters",
        );
        finish(errors)
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SetupMfaRequest {
    pub method: MfaMethod,
    pub phone: Option<String>,
}

/// TOTP enrollment material, or a note that a code was sent.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SetupMfaResponse {
    pub method: MfaMethod,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qr_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub otpauth_url: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct EnableTotpRequest {
    pub secret: String,
    pub token: String,
}

impl EnableTotpRequest {
    /// # Errors
    /// `Validation` listing every failed field.
    pub fn validate(&self) -> Result<(), AuthError> {
        let mut errors = Vec::new();
        if self.secret.trim().is_empty() {
            errors.push(FieldError::new("secret", "Secret is required"));
        }
        if self.token.chars().count() != TOTP_CODE_LEN {
            errors.push(FieldError::new("token", "TOTP token must be 6 digits"));
        }
        finish(errors)
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct EnableMfaRequest {
    pub token: String,
    pub method: MfaMethod,
}

impl EnableMfaRequest {
    /// # Errors
    /// `Validation` for a short code.
    pub fn validate(&self) -> Result<(), AuthError> {
        let mut errors = Vec::new();
        check_min(
            &mut errors,
            "token",
            &self.token,
            MIN_CODE_LEN,
            "MFA token must be at least 6 characters",
        );
        finish(errors)
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ErrorResponse {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    fn fields(result: Result<(), AuthError>) -> Vec<String> {
        match result {
            Err(AuthError::Validation(details)) => details.into_iter().map(|d| d.field).collect(),
            _ => Vec::new(),
        }
    }

    #[test]
    fn login_request_validation() {
        let request = LoginRequest {
            email: "nope".to_string(),
            password: String::new(),
        };
        assert_eq!(fields(request.validate()), ["email", "password"]);

        let request = LoginRequest {
            email: "a@x.com".to_string(),
            password: "secret1".to_string(),
        };
        assert!(request.validate().is_ok());
    }

    #[test]
    fn register_request_parses_camel_case() -> Result<()> {
        let request: RegisterRequest = serde_json::from_value(serde_json::json!({
            "email": "a@x.com",
            "password": "12345",
            "name": " ",
            "role": "warehouse",
            "organizationId": 3
        }))?;
        assert_eq!(request.role, Role::Warehouse);
        assert_eq!(request.organization_id, Some(3));
        assert_eq!(request.phone, None);
        assert_eq!(fields(request.validate()), ["password", "name"]);
        Ok(())
    }

    #[test]
    fn unknown_role_is_rejected() {
        let parsed = serde_json::from_value::<RegisterRequest>(serde_json::json!({
            "email": "a@x.com",
            "password": "123456",
            "name": "Ann",
            "role": "root"
        }));
        assert!(parsed.is_err());
    }

    #[test]
    fn change_password_lengths() {
        let request = ChangePasswordRequest {
            current_password: "secret1".to_string(),
            new_password: "short".to_string(),
        };
        assert_eq!(fields(request.validate()), ["newPassword"]);
    }

    #[test]
    fn enable_totp_needs_six_digits() {
        let request = EnableTotpRequest {
            secret: "JBSWY3DPEHPK3PXP".to_string(),
            token: "12345".to_string(),
        };
        assert_eq!(fields(request.validate()), ["token"]);
    }

    #[test]
    fn login_response_shapes() -> Result<()> {
        let challenge = LoginResponse::MfaRequired {
            requires_mfa: true,
            temp_token: "t".to_string(),
            mfa_method: MfaMethod::Sms,
        };
        let json = serde_json::to_value(&challenge)?;
        assert_eq!(json["requiresMFA"], true);
        assert_eq!(json["tempToken"], "t");
        assert_eq!(json["mfaMethod"], "sms");
        assert!(json.get("token").is_none());
        Ok(())
    }

    #[test]
    fn setup_response_omits_missing_totp_fields() -> Result<()> {
        let response = SetupMfaResponse {
            method: MfaMethod::Email,
            message: "sent".to_string(),
            secret: None,
            qr_code: None,
            otpauth_url: None,
        };
        let json = serde_json::to_value(&response)?;
        assert!(json.get("secret").is_none());
        assert!(json.get("qrCode").is_none());
        Ok(())
    }
}
