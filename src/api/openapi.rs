use crate::api::{
    handlers::{
        check_confirm, health, login, logout, pass_change, photo_fields, recall, register,
        who_am_i,
    },
    storage::PublicUser,
};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        login::login,
        logout::logout,
        register::register,
        recall::recall,
        pass_change::pass_change_recall,
        pass_change::pass_change,
        check_confirm::check_confirm,
        who_am_i::who_am_i,
        photo_fields::photo_fields,
    ),
    components(schemas(
        health::Health,
        login::Login,
        login::LoginResponse,
        logout::LogoutResponse,
        register::Register,
        register::RegisterResponse,
        recall::Recall,
        recall::RecallResponse,
        pass_change::PassChangeRecall,
        pass_change::PassChange,
        pass_change::PassChangeResponse,
        check_confirm::CheckConfirm,
        check_confirm::CheckConfirmResponse,
        who_am_i::WhoAmI,
        PublicUser,
    )),
    tags(
        (name = "auth", description = "Login, registration, password recovery and sessions"),
        (name = "photo", description = "Photo metadata dictionaries"),
        (name = "health", description = "Service health"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_lists_all_routes() {
        let spec = ApiDoc::openapi();
        for path in [
            "/health",
            "/login",
            "/logout",
            "/register",
            "/recall",
            "/pass-change-recall",
            "/pass-change",
            "/check-confirm",
            "/whoami",
            "/photo/fields",
        ] {
            assert!(spec.paths.paths.contains_key(path), "missing {path}");
        }
    }

    #[test]
    fn openapi_tags() {
        let spec = ApiDoc::openapi();
        let tags = spec.tags.clone().unwrap_or_default();
        assert!(tags.iter().any(|tag| tag.name == "auth"));
        assert!(tags.iter().any(|tag| tag.name == "photo"));
        assert!(tags.iter().any(|tag| tag.name == "health"));
    }
}
