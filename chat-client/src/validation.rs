//! Формы авторизации и профиля с правилами валидации.
//!
//! Формы одновременно являются телами запросов к API.

use std::borrow::Cow;

use serde::Serialize;
use validator::{Validate, ValidationError, ValidationErrors};

#[derive(Debug, Clone, Serialize, Validate)]
/// Форма входа.
pub struct LoginForm {
    /// Логин.
    #[validate(length(min = 3, max = 20, message = "Username must be 3-20 characters"))]
    pub username: String,
    /// Пароль.
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Validate)]
/// Форма регистрации.
pub struct RegisterForm {
    /// Логин.
    #[validate(length(min = 3, max = 20, message = "Username must be 3-20 characters"))]
    pub username: String,
    /// Полное имя.
    #[validate(length(min = 2, message = "Full name must be at least 2 characters"))]
    pub fullname: String,
    /// Email.
    #[validate(email(message = "Invalid email"))]
    pub email: String,
    /// Пароль.
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Validate)]
/// Форма обновления профиля.
pub struct UpdateProfileForm {
    /// Полное имя.
    #[validate(length(min = 2, message = "Full name must be at least 2 characters"))]
    pub fullname: String,
    /// Email.
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    /// Логин.
    #[validate(length(min = 3, max = 20, message = "Username must be 3-20 characters"))]
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "passwords_match"))]
/// Форма смены пароля.
pub struct ChangePasswordForm {
    /// Текущий пароль.
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub old_password: String,
    /// Новый пароль.
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub new_password: String,
    /// Повтор нового пароля.
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub confirm_password: String,
}

fn passwords_match(form: &ChangePasswordForm) -> Result<(), ValidationError> {
    if form.new_password != form.confirm_password {
        return Err(ValidationError::new("passwords_mismatch")
            .with_message(Cow::Borrowed("Passwords do not match")));
    }
    Ok(())
}

/// Плоский список `(поле, сообщение)` для вывода ошибок рядом с полями.
///
/// Ошибки уровня всей формы идут под ключом `__all__`.
pub fn field_messages(errors: &ValidationErrors) -> Vec<(String, String)> {
    let mut messages: Vec<(String, String)> = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errs)| {
            let field = field.to_string();
            errs.iter().map(move |err| {
                let message = err
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| err.code.to_string());
                (field.clone(), message)
            })
        })
        .collect();
    messages.sort();
    messages
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(errors: &ValidationErrors) -> Vec<String> {
        let mut fields: Vec<String> = field_messages(errors)
            .into_iter()
            .map(|(field, _)| field)
            .collect();
        fields.dedup();
        fields
    }

    #[test]
    fn login_accepts_valid_credentials() {
        let form = LoginForm {
            username: "alice".to_string(),
            password: "secret1".to_string(),
        };
        assert!(form.validate().is_ok());
    }

    #[test]
    fn login_rejects_short_username_and_password() {
        let form = LoginForm {
            username: "al".to_string(),
            password: "123".to_string(),
        };
        let errors = form.validate().expect_err("must fail");
        assert_eq!(fields(&errors), vec!["password", "username"]);
    }

    #[test]
    fn login_rejects_long_username() {
        let form = LoginForm {
            username: "a".repeat(21),
            password: "secret1".to_string(),
        };
        assert!(form.validate().is_err());
    }

    #[test]
    fn register_rejects_invalid_email() {
        let form = RegisterForm {
            username: "alice".to_string(),
            fullname: "Alice".to_string(),
            email: "not-an-email".to_string(),
            password: "secret1".to_string(),
        };
        let errors = form.validate().expect_err("must fail");
        let messages = field_messages(&errors);
        assert_eq!(
            messages,
            vec![("email".to_string(), "Invalid email".to_string())]
        );
    }

    #[test]
    fn update_profile_requires_fullname() {
        let form = UpdateProfileForm {
            fullname: "A".to_string(),
            email: "a@example.com".to_string(),
            username: "alice".to_string(),
        };
        let errors = form.validate().expect_err("must fail");
        assert_eq!(fields(&errors), vec!["fullname"]);
    }

    #[test]
    fn change_password_requires_matching_confirmation() {
        let form = ChangePasswordForm {
            old_password: "oldpass".to_string(),
            new_password: "newpass1".to_string(),
            confirm_password: "newpass2".to_string(),
        };
        let errors = form.validate().expect_err("must fail");
        let messages = field_messages(&errors);
        assert_eq!(
            messages,
            vec![("__all__".to_string(), "Passwords do not match".to_string())]
        );
    }

    #[test]
    fn change_password_serializes_camel_case() {
        let form = ChangePasswordForm {
            old_password: "oldpass".to_string(),
            new_password: "newpass1".to_string(),
            confirm_password: "newpass1".to_string(),
        };
        assert!(form.validate().is_ok());

        let json = serde_json::to_value(&form).expect("serialize");
        assert_eq!(json["oldPassword"], "oldpass");
        assert_eq!(json["newPassword"], "newpass1");
        assert_eq!(json["confirmPassword"], "newpass1");
    }
}
