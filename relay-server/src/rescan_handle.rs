//! Builds a one-shot `RescanDriver` against the state's chain and engine
//! (spec §6 `POST /relay/rescan`, and `PUT /relay/request`'s `height`).

use relay_core::{CancelToken, MembershipPredicate, RescanDriver, Result};

use crate::state::AppState;

pub async fn run(
    state: &AppState,
    from_height: u32,
    scope: Option<&MembershipPredicate<'_>>,
) -> Result<u32> {
    let driver = RescanDriver::new(state.chain.as_ref(), state.engine.as_ref());
    driver.run(from_height, &CancelToken::new(), scope).await
}
