//! Condition type registry operations.

use crate::condition_type::{validate_name, ConditionType, TypeRef};
use crate::error::{ExecutionError, RcdbResult};
use crate::value::ValueType;

use super::RcdbEngine;

impl RcdbEngine {
    /// Returns the type registered under `name`, registering it first if absent.
    ///
    /// Registration is idempotent for identical attributes.
    ///
    /// # Errors
    /// - a validation error for a malformed name
    /// - `ConditionTypeConflict` if `name` exists with a different value type
    ///   or cardinality
    pub fn get_or_register_type(
        &self,
        name: &str,
        value_type: ValueType,
        is_many_per_run: bool,
    ) -> RcdbResult<ConditionType> {
        validate_name(name, self.config.max_name_length)?;

        let _guard = self.lock_writes()?;
        self.get_or_register_type_locked(name, value_type, is_many_per_run)
    }

    pub(super) fn get_or_register_type_locked(
        &self,
        name: &str,
        value_type: ValueType,
        is_many_per_run: bool,
    ) -> RcdbResult<ConditionType> {
        if let Some(existing) = self
            .stores
            .condition_types
            .find_by_name(name)
            .map_err(Self::storage_err)?
        {
            return match existing.definition_diff(value_type, is_many_per_run) {
                None => Ok(existing),
                Some(diff) => Err(ExecutionError::ConditionTypeConflict {
                    name: name.to_string(),
                    diff,
                }
                .into()),
            };
        }

        let ty = ConditionType::new(name, value_type, is_many_per_run)?;
        self.stores
            .condition_types
            .insert(ty.clone())
            .map_err(Self::storage_err)?;

        self.audit(
            vec![ty.log_id()],
            format!(
                "ConditionType created with name='{}', type='{}', is_many_per_run='{}'",
                ty.name, ty.value_type, ty.is_many_per_run
            ),
            None,
        );
        Ok(ty)
    }

    /// Looks up a registered type by name.
    ///
    /// # Errors
    /// `ConditionTypeNotFound` if no type has that name.
    pub fn lookup_type(&self, name: &str) -> RcdbResult<ConditionType> {
        self.stores
            .condition_types
            .find_by_name(name)
            .map_err(Self::storage_err)?
            .ok_or_else(|| {
                ExecutionError::ConditionTypeNotFound {
                    name: name.to_string(),
                }
                .into()
            })
    }

    /// All registered types, sorted by name.
    ///
    /// # Errors
    /// A storage error if the registry cannot be read.
    pub fn list_types(&self) -> RcdbResult<Vec<ConditionType>> {
        self.stores
            .condition_types
            .list()
            .map_err(Self::storage_err)
    }

    /// Normalizes a type reference to the stored definition.
    ///
    /// A `TypeRef::Type` is looked up again by id, so an object that was never
    /// registered here does not resolve.
    pub(super) fn resolve_type(&self, type_ref: TypeRef<'_>) -> RcdbResult<ConditionType> {
        match type_ref {
            TypeRef::Name(name) => self.lookup_type(name),
            TypeRef::Type(ty) => self
                .stores
                .condition_types
                .get(ty.id)
                .map_err(Self::storage_err)?
                .ok_or_else(|| {
                    ExecutionError::ConditionTypeNotFound {
                        name: ty.name.clone(),
                    }
                    .into()
                }),
        }
    }
}
