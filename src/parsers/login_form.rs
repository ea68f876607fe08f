use crate::models::{ClassifiedField, FieldRole, FormField, LoginForm};
use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;
use url::Url;

/// Name fragments that mark a text input as the username box.
const USERNAME_TOKENS: [&str; 5] = ["user", "roll", "id", "uname", "email"];

// Forms used by the portal family we target, checked before the first-form fallback.
static PORTAL_FORM_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(
        "form#login-form, form#form-login, form#loginForm, form.login-form, form[name=\"login\"]",
    )
    .expect("portal form selector is valid")
});
static FORM_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("form").expect("form selector is valid"));
static INPUT_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("input").expect("input selector is valid"));

/// Finds the login form on `html` and classifies its inputs.
///
/// Returns `None` when the page has no form at all; the caller then falls back
/// to [`LoginForm::fallback`]. Relative `action` attributes are resolved
/// against `page_url`, and a missing `action` means "post back to this page".
pub fn detect_login_form(html: &str, page_url: &str) -> Option<LoginForm> {
    let document = Html::parse_document(html);

    let form = document
        .select(&PORTAL_FORM_SELECTOR)
        .next()
        .or_else(|| document.select(&FORM_SELECTOR).next())?;

    let action_url = resolve_action(form.value().attr("action"), page_url);
    let fields = read_fields(form);

    Some(LoginForm::new(action_url, classify_fields(&fields)))
}

/// Reads every named `<input>` inside `form`, in page order.
pub fn read_fields(form: ElementRef<'_>) -> Vec<FormField> {
    form.select(&INPUT_SELECTOR)
        .filter_map(|input| {
            let element = input.value();
            let name = element.attr("name").map(str::trim).filter(|n| !n.is_empty())?;
            let declared_type = element
                .attr("type")
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .unwrap_or("text");

            let mut field = FormField::new(name, declared_type, element.attr("value"));
            field.checked = element.attr("checked").is_some();
            Some(field)
        })
        .collect()
}

/// Classifies `fields` in order, first match wins.
///
/// When no text input carries a username-like name, the first text-like input
/// left as [`FieldRole::Other`] becomes the username.
pub fn classify_fields(fields: &[FormField]) -> Vec<ClassifiedField> {
    let mut has_username = false;
    let mut has_password = false;

    let mut classified: Vec<ClassifiedField> = fields
        .iter()
        .map(|field| {
            let (role, value) = classify_field(field, has_username, has_password);
            match role {
                FieldRole::Username => has_username = true,
                FieldRole::Password => has_password = true,
                _ => {}
            }
            ClassifiedField {
                name: field.name.clone(),
                role,
                value,
            }
        })
        .collect();

    if !has_username {
        let last_resort = fields
            .iter()
            .zip(classified.iter_mut())
            .find(|(field, slot)| field.is_text_like() && slot.role == FieldRole::Other);

        if let Some((_, slot)) = last_resort {
            slot.role = FieldRole::Username;
            slot.value = None;
        }
    }

    classified
}

/// Classifies a single input given what has already been claimed.
///
/// Returns the role and the literal value the field contributes to the POST
/// body on its own (the credential is filled in later).
pub fn classify_field(
    field: &FormField,
    has_username: bool,
    has_password: bool,
) -> (FieldRole, Option<String>) {
    let prefilled = field.default_value.clone().filter(|v| !v.is_empty());

    match field.declared_type.as_str() {
        "password" if !has_password => (FieldRole::Password, field.default_value.clone()),
        "text" | "email" if !has_username && is_username_name(&field.name) => {
            (FieldRole::Username, None)
        }
        "hidden" => (
            FieldRole::Hidden,
            Some(field.default_value.clone().unwrap_or_default()),
        ),
        "checkbox" | "radio" if field.checked => (
            FieldRole::Other,
            Some(field.default_value.clone().unwrap_or_else(|| "on".to_string())),
        ),
        "checkbox" | "radio" => (FieldRole::Other, None),
        // password (already claimed), text, email, submit and anything else
        _ => (FieldRole::Other, prefilled),
    }
}

fn is_username_name(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    USERNAME_TOKENS.iter().any(|token| name.contains(token))
}

fn resolve_action(action: Option<&str>, page_url: &str) -> String {
    let action = action.map(str::trim).filter(|a| !a.is_empty());

    match (Url::parse(page_url), action) {
        (Ok(base), Some(action)) => base
            .join(action)
            .map(String::from)
            .unwrap_or_else(|_| action.to_string()),
        (Err(_), Some(action)) => action.to_string(),
        (_, None) => page_url.to_string(),
    }
}
