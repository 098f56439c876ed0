use serde::Serialize;
use sha2::{Digest as _, Sha256};

use crate::compile::BindingTable;
use crate::mono::MonoMap;
use crate::slice::WidePointerTable;

fn update_json<T: Serialize>(h: &mut Sha256, tag: u8, value: &T) {
    let bytes = serde_json::to_vec(value).unwrap_or_default();
    h.update([tag]);
    h.update((bytes.len() as u64).to_le_bytes());
    h.update(&bytes);
}

/// Hex SHA-256 over the serialized output tables.
pub(crate) fn tables_fingerprint(
    bindings: &BindingTable,
    mono: &MonoMap,
    wide_pointers: &WidePointerTable,
) -> String {
    let mut h = Sha256::new();
    update_json(&mut h, 0x01, bindings);
    update_json(&mut h, 0x02, mono);
    update_json(&mut h, 0x03, wide_pointers);
    h.finalize().iter().map(|b| format!("{b:02x}")).collect()
}
