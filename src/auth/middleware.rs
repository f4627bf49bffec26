/*
 *     Copyright (C) 2023  Fritz Ochsmann
 *
 *     This program is free software: you can redistribute it and/or modify
 *     it under the terms of the GNU Affero General Public License as published
 *     by the Free Software Foundation, either version 3 of the License, or
 *     (at your option) any later version.
 *
 *     This program is distributed in the hope that it will be useful,
 *     but WITHOUT ANY WARRANTY; without even the implied warranty of
 *     MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *     GNU Affero General Public License for more details.
 *
 *     You should have received a copy of the GNU Affero General Public License
 *     along with this program.  If not, see <http://www.gnu.org/licenses/>.
 */

use crate::auth::Actor;
use crate::prelude::*;
use axum::extract::State;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

/// Carries the account id the upstream authentication proxy asserted for the request.
pub const ACCOUNT_HEADER: &str = "x-account";

/// Resolves the calling account and hands it to the handlers as `Account` and `Actor` extensions.
pub async fn require_account<B>(
    State(state): State<ApplicationState>,
    mut request: Request<B>,
    next: Next<B>,
) -> Response {
    let id = match request
        .headers()
        .get(ACCOUNT_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(|value| Id::try_from(("account", value)))
    {
        Some(Ok(id)) => id,
        _ => return ApplicationError::Unauthorized.into_response(),
    };

    match Account::fetch(&id.to_thing(), state.info()).await {
        Ok(Some(account)) => {
            let extensions = request.extensions_mut();
            extensions.insert(Actor::from(&account));
            extensions.insert(account);

            next.run(request).await
        }
        Ok(None) => ApplicationError::Unauthorized.into_response(),
        Err(error) => error.into_response(),
    }
}
