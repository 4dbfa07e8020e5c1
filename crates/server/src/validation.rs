//! Input checks run before any side effect. Failures come back as a
//! field-keyed error map.

use shared::{
    ComposeRequest, ContactForm, FieldErrors, ForwardRequest, ProductInput, QuoteForm,
    RegisterRequest, ReplyRequest, SettingsUpdate, TemplateInput,
};

const MAX_NAME: usize = 100;
const MAX_SUBJECT: usize = 200;
const MIN_PASSWORD: usize = 8;

/// Accumulates errors across fields.
#[derive(Default)]
struct Checks {
    errors: FieldErrors,
}

impl Checks {
    fn required(&mut self, field: &str, value: &str, label: &str) -> bool {
        if value.trim().is_empty() {
            self.errors.add(field, format!("{} is required", label));
            return false;
        }
        true
    }

    fn max_len(&mut self, field: &str, value: &str, max: usize, label: &str) {
        if value.chars().count() > max {
            self.errors
                .add(field, format!("{} must be at most {} characters", label, max));
        }
    }

    fn email(&mut self, field: &str, value: &str) {
        if self.required(field, value, "Email") && !is_valid_email(value) {
            self.errors.add(field, "Invalid email address");
        }
    }

    fn optional_email(&mut self, field: &str, value: Option<&str>) {
        if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
            if !is_valid_email(value) {
                self.errors.add(field, "Invalid email address");
            }
        }
    }

    fn finish(self) -> Result<(), FieldErrors> {
        self.errors.into_result()
    }
}

/// Basic email validation.
pub fn is_valid_email(email: &str) -> bool {
    let email = email.trim();

    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') || email.contains(char::is_whitespace) {
        return false;
    }
    if domain.is_empty() || !domain.contains('.') {
        return false;
    }
    !domain.split('.').any(|p| p.is_empty())
}

pub fn validate_contact(form: &ContactForm) -> Result<(), FieldErrors> {
    let mut checks = Checks::default();
    if checks.required("name", &form.name, "Name") {
        checks.max_len("name", &form.name, MAX_NAME, "Name");
    }
    checks.email("email", &form.email);
    checks.max_len("subject", &form.subject, MAX_SUBJECT, "Subject");
    checks.required("message", &form.message, "Message");
    checks.finish()
}

pub fn validate_quote_form(form: &QuoteForm) -> Result<(), FieldErrors> {
    let mut checks = Checks::default();
    if checks.required("name", &form.name, "Name") {
        checks.max_len("name", &form.name, MAX_NAME, "Name");
    }
    checks.email("email", &form.email);
    checks.required("phone", &form.phone, "Phone");
    checks.finish()
}

/// Drafts may be saved incomplete; anything sent or scheduled may not.
pub fn validate_compose(req: &ComposeRequest) -> Result<(), FieldErrors> {
    let mut checks = Checks::default();
    if req.save_as_draft {
        checks.optional_email("email", Some(&req.email));
    } else {
        checks.email("email", &req.email);
        checks.required("subject", &req.subject, "Subject");
        checks.required("body", &req.body, "Message");
    }
    checks.max_len("subject", &req.subject, MAX_SUBJECT, "Subject");
    checks.finish()
}

pub fn validate_reply(req: &ReplyRequest) -> Result<(), FieldErrors> {
    let mut checks = Checks::default();
    checks.required("body", &req.body, "Message");
    checks.finish()
}

pub fn validate_forward(req: &ForwardRequest) -> Result<(), FieldErrors> {
    let mut checks = Checks::default();
    checks.email("email", &req.email);
    checks.finish()
}

pub fn validate_quote_reply(subject: &str, body: &str) -> Result<(), FieldErrors> {
    let mut checks = Checks::default();
    checks.required("subject", subject, "Subject");
    checks.max_len("subject", subject, MAX_SUBJECT, "Subject");
    checks.required("body", body, "Message");
    checks.finish()
}

pub fn validate_product(input: &ProductInput) -> Result<(), FieldErrors> {
    let mut checks = Checks::default();
    if checks.required("name", &input.name, "Name") {
        checks.max_len("name", &input.name, MAX_NAME, "Name");
    }
    checks.required("category", &input.category, "Category");
    if !input.price.is_finite() || input.price <= 0.0 {
        checks.errors.add("price", "Price must be greater than zero");
    }
    checks.finish()
}

pub fn validate_template(input: &TemplateInput) -> Result<(), FieldErrors> {
    let mut checks = Checks::default();
    checks.required("name", &input.name, "Name");
    checks.required("body", &input.body, "Body");
    checks.finish()
}

pub fn validate_register(req: &RegisterRequest) -> Result<(), FieldErrors> {
    let mut checks = Checks::default();
    checks.email("email", &req.email);
    validate_password(&mut checks, "password", &req.password);
    checks.finish()
}

pub fn validate_new_password(password: &str) -> Result<(), FieldErrors> {
    let mut checks = Checks::default();
    validate_password(&mut checks, "new_password", password);
    checks.finish()
}

fn validate_password(checks: &mut Checks, field: &str, password: &str) {
    if password.chars().count() < MIN_PASSWORD {
        checks.errors.add(
            field,
            format!("Password must be at least {} characters", MIN_PASSWORD),
        );
    }
}

pub fn validate_settings(update: &SettingsUpdate) -> Result<(), FieldErrors> {
    let mut checks = Checks::default();
    checks.optional_email("company_email", update.company_email.as_deref());
    checks.optional_email("smtp_from_email", update.smtp_from_email.as_deref());
    checks.optional_email("notification_email", update.notification_email.as_deref());
    if let Some(port) = update.smtp_port {
        if !(1..=65535).contains(&port) {
            checks.errors.add("smtp_port", "SMTP port must be 1-65535");
        }
    }
    if let Some(minutes) = update.session_timeout_minutes {
        if !(5..=43_200).contains(&minutes) {
            checks
                .errors
                .add("session_timeout_minutes", "Session timeout must be 5-43200 minutes");
        }
    }
    checks.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_email() {
        assert!(is_valid_email("john@x.com"));
        assert!(is_valid_email("sales.team@prime-cuts.co.nz"));
    }

    #[test]
    fn test_invalid_email() {
        assert!(!is_valid_email(""));
        assert!(!is_valid_email("john"));
        assert!(!is_valid_email("@x.com"));
        assert!(!is_valid_email("john@"));
        assert!(!is_valid_email("john@x"));
        assert!(!is_valid_email("john@@x.com"));
        assert!(!is_valid_email("jo hn@x.com"));
    }

    #[test]
    fn test_quote_form_collects_all_errors() {
        let errors = validate_quote_form(&QuoteForm::default()).unwrap_err();
        assert!(errors.get("name").is_some());
        assert!(errors.get("email").is_some());
        assert!(errors.get("phone").is_some());
    }

    #[test]
    fn test_quote_form_accepts_minimal() {
        let form = QuoteForm {
            name: "John Doe".into(),
            email: "john@x.com".into(),
            phone: "555".into(),
            product_interest: Some("beef".into()),
            quantity: Some("10kg".into()),
            ..QuoteForm::default()
        };
        assert!(validate_quote_form(&form).is_ok());
    }

    #[test]
    fn test_draft_may_be_incomplete() {
        let draft = ComposeRequest {
            save_as_draft: true,
            ..ComposeRequest::default()
        };
        assert!(validate_compose(&draft).is_ok());

        let send = ComposeRequest::default();
        let errors = validate_compose(&send).unwrap_err();
        assert_eq!(errors.get("email"), Some(&["Email is required".to_string()][..]));
        assert!(errors.get("body").is_some());
    }

    #[test]
    fn test_product_price_must_be_positive() {
        let input = ProductInput {
            name: "Ribeye".into(),
            description: String::new(),
            price: 0.0,
            category: "Beef".into(),
            product_type: shared::ProductType::Chilled,
            image_url: None,
        };
        let errors = validate_product(&input).unwrap_err();
        assert!(errors.get("price").is_some());
    }

    #[test]
    fn test_settings_ranges() {
        let update = SettingsUpdate {
            smtp_port: Some(0),
            session_timeout_minutes: Some(1),
            notification_email: Some("nope".into()),
            ..SettingsUpdate::default()
        };
        let errors = validate_settings(&update).unwrap_err();
        assert!(errors.get("smtp_port").is_some());
        assert!(errors.get("session_timeout_minutes").is_some());
        assert!(errors.get("notification_email").is_some());

        let clearing = SettingsUpdate {
            notification_email: Some(String::new()),
            ..SettingsUpdate::default()
        };
        assert!(validate_settings(&clearing).is_ok());
    }
}
