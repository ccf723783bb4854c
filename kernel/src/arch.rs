// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Architecture dispatch.
//!
//! The rest of the kernel talks to this module and never to `aarch64`/
//! `fake` directly: production code runs against real hardware, host-side
//! tests run the scheduler and task bookkeeping against a backend with no
//! assembly in it at all.

use cfg_if::cfg_if;

cfg_if! {
    if #[cfg(all(target_arch = "aarch64", not(feature = "test-harness")))] {
        mod aarch64;
        pub use aarch64::*;
    } else {
        mod fake;
        pub use fake::*;
    }
}
