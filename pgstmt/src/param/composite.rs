use bytes::BufMut;

use super::{BindError, ParameterList};
use crate::{encode::Encode, postgres::Oid, transport::Capabilities, value::Value};

/// Parameters of a multi statement query.
///
/// Each statement owns its own list, global 1-based indices are routed to
/// the owning list. Unlike [`ParameterList`], binding past the end is an error.
#[derive(Debug, Clone, Default)]
pub struct CompositeParameterList {
    lists: Vec<ParameterList>,
    /// Global index offset of each list.
    offsets: Vec<usize>,
    total: usize,
}

impl CompositeParameterList {
    pub fn new(lists: Vec<ParameterList>) -> CompositeParameterList {
        let mut offsets = Vec::with_capacity(lists.len());
        let mut total = 0;
        for list in &lists {
            offsets.push(total);
            total += list.len();
        }
        Self { lists, offsets, total }
    }

    /// Returns the total number of parameters.
    pub fn len(&self) -> usize {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Returns parameter list of each statement.
    pub fn lists(&self) -> &[ParameterList] {
        &self.lists
    }

    pub(crate) fn lists_mut(&mut self) -> &mut [ParameterList] {
        &mut self.lists
    }

    /// Find owning list and its local index.
    fn locate(&self, index: usize) -> Result<(usize, usize), BindError> {
        if index == 0 || index > self.total {
            return Err(BindError::IndexOutOfRange { index, len: self.total });
        }
        // last list whose offset is below index, skipping empty lists
        let sub = self.offsets.partition_point(|offset| *offset < index) - 1;
        Ok((sub, index - self.offsets[sub]))
    }

    fn global(&self, sub: usize, err: BindError) -> BindError {
        match err {
            BindError::Unbound { index } => BindError::Unbound { index: index + self.offsets[sub] },
            err => err,
        }
    }

    pub fn bind(&mut self, index: usize, value: Value, oid: Oid) -> Result<(), BindError> {
        let (sub, local) = self.locate(index)?;
        self.lists[sub].bind(local, value, oid)
    }

    pub fn bind_value(&mut self, index: usize, value: impl Encode) -> Result<(), BindError> {
        let (sub, local) = self.locate(index)?;
        self.lists[sub].bind_value(local, value)
    }

    pub fn bind_null(&mut self, index: usize, oid: Oid) -> Result<(), BindError> {
        let (sub, local) = self.locate(index)?;
        self.lists[sub].bind_null(local, oid)
    }

    pub fn mark_output(&mut self, index: usize) -> Result<(), BindError> {
        let (sub, local) = self.locate(index)?;
        self.lists[sub].mark_output(local)
    }

    pub fn set_resolved_type(&mut self, index: usize, oid: Oid) -> Result<(), BindError> {
        let (sub, local) = self.locate(index)?;
        self.lists[sub].set_resolved_type(local, oid)
    }

    pub fn wire_length(&self, index: usize) -> Result<i32, BindError> {
        let (sub, local) = self.locate(index)?;
        self.lists[sub].wire_length(local).map_err(|e| self.global(sub, e))
    }

    pub fn serialize(&self, index: usize, buf: impl BufMut) -> Result<(), BindError> {
        let (sub, local) = self.locate(index)?;
        self.lists[sub].serialize(local, buf).map_err(|e| self.global(sub, e))
    }

    pub fn to_literal(&self, index: usize, caps: &Capabilities) -> Result<String, BindError> {
        let (sub, local) = self.locate(index)?;
        self.lists[sub].to_literal(local, caps)
    }

    pub fn check_all_set(&self) -> Result<(), BindError> {
        for (sub, list) in self.lists.iter().enumerate() {
            list.check_all_set().map_err(|e| self.global(sub, e))?;
        }
        Ok(())
    }

    pub fn has_unresolved_types(&self) -> bool {
        self.lists.iter().any(ParameterList::has_unresolved_types)
    }

    pub fn type_oids(&self) -> Vec<Oid> {
        self.lists.iter().flat_map(ParameterList::type_oids).collect()
    }

    pub fn in_count(&self) -> usize {
        self.lists.iter().map(ParameterList::in_count).sum()
    }

    pub fn out_count(&self) -> usize {
        self.lists.iter().map(ParameterList::out_count).sum::<usize>().max(1)
    }

    pub fn clear(&mut self) {
        self.lists.iter_mut().for_each(ParameterList::clear);
    }

    /// Replace all parameters with a copy of `other`, both must have the same shape.
    pub fn replace(&mut self, other: &CompositeParameterList) -> Result<(), BindError> {
        if self.offsets != other.offsets || self.total != other.total {
            return Err(BindError::Incompatible);
        }
        self.lists.clone_from(&other.lists);
        Ok(())
    }
}
