use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use uuid::Uuid;

use crate::auth::hash_access_token;
use crate::error::ApiError;
use crate::models::{AppState, UserRole};
use crate::scheduling::{Patient, Professional};

#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub role: UserRole,
}

#[derive(Debug, sqlx::FromRow)]
struct SessionLookupRow {
    session_token_id: Uuid,
    user_id: Uuid,
    full_name: String,
    is_admin: bool,
    patient_id: Option<Uuid>,
    professional_id: Option<Uuid>,
    professional_type: Option<String>,
}

impl SessionLookupRow {
    fn into_role(self) -> UserRole {
        let patient = self.patient_id.map(|patient_id| Patient {
            patient_id,
            user_id: self.user_id,
            name: self.full_name.clone(),
        });
        let professional = self.professional_id.map(|professional_id| Professional {
            professional_id,
            user_id: self.user_id,
            name: self.full_name.clone(),
            professional_type: self.professional_type.clone().unwrap_or_default(),
        });
        UserRole::resolve(self.is_admin, patient, professional)
    }
}

impl FromRequestParts<AppState> for AuthContext {
    type Rejection = ApiError;

    fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        async move {
            let TypedHeader(authz): TypedHeader<Authorization<Bearer>> =
                TypedHeader::from_request_parts(parts, state)
                    .await
                    .map_err(|_| ApiError::session_expired())?;

            let token_hash = hash_access_token(authz.token());

            // Session must be live and the user active; profiles are optional.
            let row: SessionLookupRow = sqlx::query_as::<_, SessionLookupRow>(
                r#"
                SELECT st.session_token_id,
                       st.user_id,
                       u.full_name,
                       u.is_admin,
                       p.patient_id,
                       pr.professional_id,
                       pr.professional_type
                FROM session_token st
                JOIN app_user u ON u.user_id = st.user_id
                LEFT JOIN patient p ON p.user_id = u.user_id
                LEFT JOIN professional pr ON pr.user_id = u.user_id
                WHERE st.session_token_hash = $1
                  AND st.revoked_at IS NULL
                  AND st.expires_at > now()
                  AND u.is_active = true
                "#,
            )
            .bind(&token_hash)
            .fetch_optional(&state.db)
            .await
            .map_err(|e| ApiError::Internal(format!("db error: {e}")))?
            .ok_or_else(ApiError::session_expired)?;

            // best-effort
            let _ = sqlx::query(
                r#"
                UPDATE session_token
                SET last_seen_at = now()
                WHERE session_token_id = $1
                "#,
            )
            .bind(row.session_token_id)
            .execute(&state.db)
            .await;

            Ok(AuthContext {
                user_id: row.user_id,
                role: row.into_role(),
            })
        }
    }
}
