//! Read-only binding-table listing for diagnostics (spec §6). The exact
//! textual encoding is explicitly non-load-bearing; this one line per
//! binding, `{device} {endpoint_id} {role} {name}`, is modelled on the
//! original's `/proc/kbus/bindings` report minus the `pid` column (this
//! design never leaves a single OS process, so there is no foreign pid).

use crate::binding::Role;
use crate::endpoint::EndpointId;

pub fn render(rows: Vec<(EndpointId, Role, String)>, device: u32) -> String {
    let mut out = String::new();
    for (endpoint, role, name) in rows {
        let role_char = match role {
            Role::Replier => 'R',
            Role::Listener => 'L',
        };
        out.push_str(&format!("{} {} {} {}\n", device, endpoint, role_char, name));
    }
    out
}
