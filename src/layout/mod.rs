//! Storage layout planning.
//!
//! Field `i` owns slot `i`. Scalars live directly in their slot. Mapping
//! elements live at `keccak256(pad32(key) ++ pad32(base))`. A sequence keeps
//! its length at `base` and element `i` at `keccak256(pad32(base)) + i`.

use alloy_primitives::{keccak256, U256};
use tracing::debug;

use crate::extractor::{Accessor, ContractModel, FieldId, StoragePath, Type};

/// How the element addresses of a field are derived from its base slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotRecipe {
    /// The value is stored in the base slot itself.
    Direct,
    /// `slot_for(base, key)`, then `value` applied to the derived slot.
    Mapping { value: Box<SlotRecipe> },
    /// Length at `base`, elements from `keccak256(base)` onward.
    Sequence,
}

impl SlotRecipe {
    fn for_type(ty: &Type) -> Self {
        match ty {
            Type::Mapping(_, value) => SlotRecipe::Mapping {
                value: Box::new(SlotRecipe::for_type(value)),
            },
            Type::Sequence(_) => SlotRecipe::Sequence,
            _ => SlotRecipe::Direct,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSlot {
    pub name: String,
    pub slot: U256,
    pub ty: Type,
    pub recipe: SlotRecipe,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLayout {
    fields: Vec<FieldSlot>,
}

impl StorageLayout {
    /// Assigns every field its base slot. Total for any extracted model.
    pub fn plan(model: &ContractModel) -> Self {
        let fields = model
            .fields
            .iter()
            .enumerate()
            .map(|(i, field)| FieldSlot {
                name: field.name.clone(),
                slot: U256::from(i),
                ty: field.ty.clone(),
                recipe: SlotRecipe::for_type(&field.ty),
            })
            .collect::<Vec<_>>();

        for field in &fields {
            debug!(
                contract = %model.name,
                field = %field.name,
                slot = %field.slot,
                "assigned storage slot"
            );
        }

        Self { fields }
    }

    pub fn slot(&self, field: FieldId) -> U256 {
        self.fields[field.0].slot
    }

    pub fn field(&self, field: FieldId) -> &FieldSlot {
        &self.fields[field.0]
    }

    pub fn fields(&self) -> &[FieldSlot] {
        &self.fields
    }

    /// Recipe of the location `path` addresses. `None` when the accessors do
    /// not fit the shape of the field: a key on something other than a
    /// mapping, or an index on something other than a sequence.
    pub fn resolve(&self, path: &StoragePath) -> Option<SlotRecipe> {
        let mut recipe = self.field(path.field).recipe.clone();
        for accessor in &path.accessors {
            recipe = match (accessor, recipe) {
                (Accessor::Key(_), SlotRecipe::Mapping { value }) => *value,
                (Accessor::Index(_), SlotRecipe::Sequence) => SlotRecipe::Direct,
                _ => return None,
            };
        }
        Some(recipe)
    }
}

/// Slot of `mapping[key]` for a mapping rooted at `base`.
pub fn mapping_slot(key: U256, base: U256) -> U256 {
    let mut buf = [0u8; 64];
    buf[..32].copy_from_slice(&key.to_be_bytes::<32>());
    buf[32..].copy_from_slice(&base.to_be_bytes::<32>());
    U256::from_be_bytes(keccak256(buf).0)
}

/// First element slot of a sequence rooted at `base`.
pub fn sequence_data_slot(base: U256) -> U256 {
    U256::from_be_bytes(keccak256(base.to_be_bytes::<32>()).0)
}

/// Slot of `sequence[index]`. Wraps like the EVM's `ADD`.
pub fn sequence_element_slot(base: U256, index: U256) -> U256 {
    sequence_data_slot(base).wrapping_add(index)
}
