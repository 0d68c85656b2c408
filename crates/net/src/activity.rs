use axum::extract::State;
use voxen_database::SafeDatabase;
use voxen_service::parser::Activity;
use voxen_service::repo::activities;

use crate::access::PageQuery;
use crate::auth::AuthUser;
use crate::error::{ok, ApiResult};
use crate::extract::Query;
use crate::state::AppState;

/// The caller's own actions across all spaces, newest first.
pub async fn my_activities<D: SafeDatabase>(
    State(state): State<AppState<D>>,
    auth: AuthUser,
    Query(page): Query<PageQuery>,
) -> ApiResult<Vec<Activity>> {
    let (limit, offset) = page.bounds();
    ok(activities::list_for_actor(&state.db, &auth.address, limit, offset)?)
}
