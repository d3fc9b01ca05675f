use std::ops::Range;
use std::sync::{Arc, Mutex};

use crate::constants::MAX_TABLE_SIZE;
use crate::error::StoreError;

/// The four data tables of the Modbus data model
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Table {
    /// single-bit read/write outputs
    Coils,
    /// single-bit inputs, read-only to clients
    DiscreteInputs,
    /// 16-bit read/write registers
    HoldingRegisters,
    /// 16-bit registers, read-only to clients
    InputRegisters,
}

/// Tables that hold single bits
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BitTable {
    /// see [Table::Coils]
    Coils,
    /// see [Table::DiscreteInputs]
    DiscreteInputs,
}

/// Tables that hold 16-bit registers
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegisterTable {
    /// see [Table::HoldingRegisters]
    HoldingRegisters,
    /// see [Table::InputRegisters]
    InputRegisters,
}

/// Number of entries in each table of a [RegisterStore]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StoreSizes {
    /// number of coils
    pub coils: usize,
    /// number of discrete inputs
    pub discrete_inputs: usize,
    /// number of holding registers
    pub holding_registers: usize,
    /// number of input registers
    pub input_registers: usize,
}

/// In-memory Modbus data tables served to clients
///
/// Every table is dense: addresses `0..capacity` always hold a value. Tables start
/// out zeroed (registers) or cleared (bits).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterStore {
    coils: Vec<bool>,
    discrete_inputs: Vec<bool>,
    holding_registers: Vec<u16>,
    input_registers: Vec<u16>,
}

/// A store shared between the server task and the application.
///
/// The server locks it once per request.
pub type SharedStore = Arc<Mutex<RegisterStore>>;

impl Table {
    /// Returns true if clients are not allowed to write the table
    pub fn is_read_only(self) -> bool {
        matches!(self, Table::DiscreteInputs | Table::InputRegisters)
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Table::Coils => f.write_str("coils"),
            Table::DiscreteInputs => f.write_str("discrete inputs"),
            Table::HoldingRegisters => f.write_str("holding registers"),
            Table::InputRegisters => f.write_str("input registers"),
        }
    }
}

impl From<BitTable> for Table {
    fn from(table: BitTable) -> Self {
        match table {
            BitTable::Coils => Table::Coils,
            BitTable::DiscreteInputs => Table::DiscreteInputs,
        }
    }
}

impl From<RegisterTable> for Table {
    fn from(table: RegisterTable) -> Self {
        match table {
            RegisterTable::HoldingRegisters => Table::HoldingRegisters,
            RegisterTable::InputRegisters => Table::InputRegisters,
        }
    }
}

impl StoreSizes {
    /// construct from the size of each table
    pub fn new(
        coils: usize,
        discrete_inputs: usize,
        holding_registers: usize,
        input_registers: usize,
    ) -> Self {
        Self {
            coils,
            discrete_inputs,
            holding_registers,
            input_registers,
        }
    }

    /// every table sized to the whole addressable space
    pub fn full() -> Self {
        Self::new(MAX_TABLE_SIZE, MAX_TABLE_SIZE, MAX_TABLE_SIZE, MAX_TABLE_SIZE)
    }

    fn validate(&self) -> Result<(), StoreError> {
        let tables = [
            (Table::Coils, self.coils),
            (Table::DiscreteInputs, self.discrete_inputs),
            (Table::HoldingRegisters, self.holding_registers),
            (Table::InputRegisters, self.input_registers),
        ];

        for (table, size) in tables {
            if size > MAX_TABLE_SIZE {
                return Err(StoreError::Allocation { table, size });
            }
        }

        Ok(())
    }
}

impl Default for StoreSizes {
    fn default() -> Self {
        Self::full()
    }
}

impl RegisterStore {
    /// Allocate the four tables, failing if any size exceeds [MAX_TABLE_SIZE]
    pub fn create(sizes: StoreSizes) -> Result<Self, StoreError> {
        sizes.validate()?;
        Ok(Self {
            coils: vec![false; sizes.coils],
            discrete_inputs: vec![false; sizes.discrete_inputs],
            holding_registers: vec![0; sizes.holding_registers],
            input_registers: vec![0; sizes.input_registers],
        })
    }

    /// Move the store behind a mutex so it can be handed to the server
    pub fn wrap(self) -> SharedStore {
        Arc::new(Mutex::new(self))
    }

    /// size of each table
    pub fn sizes(&self) -> StoreSizes {
        StoreSizes::new(
            self.coils.len(),
            self.discrete_inputs.len(),
            self.holding_registers.len(),
            self.input_registers.len(),
        )
    }

    /// number of entries in a table
    pub fn capacity(&self, table: Table) -> usize {
        match table {
            Table::Coils => self.coils.len(),
            Table::DiscreteInputs => self.discrete_inputs.len(),
            Table::HoldingRegisters => self.holding_registers.len(),
            Table::InputRegisters => self.input_registers.len(),
        }
    }

    /// Set every holding register to its own address
    pub fn seed_identity_holding_registers(&mut self) {
        for (index, value) in self.holding_registers.iter_mut().enumerate() {
            // capacity never exceeds 65535, so the index always fits
            *value = index as u16;
        }
    }

    /// Read `count` bits starting at `start`
    pub fn read_bits(
        &self,
        table: BitTable,
        start: u16,
        count: usize,
    ) -> Result<&[bool], StoreError> {
        let values = match table {
            BitTable::Coils => &self.coils,
            BitTable::DiscreteInputs => &self.discrete_inputs,
        };
        let range = checked_range(table.into(), values.len(), start, count)?;
        Ok(&values[range])
    }

    /// Read `count` registers starting at `start`
    pub fn read_registers(
        &self,
        table: RegisterTable,
        start: u16,
        count: usize,
    ) -> Result<&[u16], StoreError> {
        let values = match table {
            RegisterTable::HoldingRegisters => &self.holding_registers,
            RegisterTable::InputRegisters => &self.input_registers,
        };
        let range = checked_range(table.into(), values.len(), start, count)?;
        Ok(&values[range])
    }

    /// Write bits on behalf of a client starting at `start`
    ///
    /// Discrete inputs are rejected with [StoreError::ReadOnly]. The table is left
    /// untouched when an error is returned.
    pub fn write_bits(
        &mut self,
        table: BitTable,
        start: u16,
        values: &[bool],
    ) -> Result<(), StoreError> {
        let id = writable(table.into())?;
        let dest = match table {
            BitTable::Coils => &mut self.coils,
            BitTable::DiscreteInputs => &mut self.discrete_inputs,
        };
        let range = checked_range(id, dest.len(), start, values.len())?;
        dest[range].copy_from_slice(values);
        Ok(())
    }

    /// Write registers on behalf of a client starting at `start`
    ///
    /// Input registers are rejected with [StoreError::ReadOnly]. The table is left
    /// untouched when an error is returned.
    pub fn write_registers(
        &mut self,
        table: RegisterTable,
        start: u16,
        values: &[u16],
    ) -> Result<(), StoreError> {
        let id = writable(table.into())?;
        let dest = match table {
            RegisterTable::HoldingRegisters => &mut self.holding_registers,
            RegisterTable::InputRegisters => &mut self.input_registers,
        };
        let range = checked_range(id, dest.len(), start, values.len())?;
        dest[range].copy_from_slice(values);
        Ok(())
    }

    /// Modify a holding register using an AND mask and an OR mask, returning the new value
    ///
    /// `result = (current & and_mask) | (or_mask & !and_mask)`
    pub fn mask_write_register(
        &mut self,
        address: u16,
        and_mask: u16,
        or_mask: u16,
    ) -> Result<u16, StoreError> {
        let capacity = self.holding_registers.len();
        let value = self
            .holding_registers
            .get_mut(address as usize)
            .ok_or(StoreError::OutOfRange {
                table: Table::HoldingRegisters,
                start: address,
                count: 1,
                capacity,
            })?;
        *value = (*value & and_mask) | (or_mask & !and_mask);
        Ok(*value)
    }

    /// mutable access to the coils for the local application
    pub fn coils_mut(&mut self) -> &mut [bool] {
        self.coils.as_mut_slice()
    }

    /// mutable access to the discrete inputs for the local application
    pub fn discrete_inputs_mut(&mut self) -> &mut [bool] {
        self.discrete_inputs.as_mut_slice()
    }

    /// mutable access to the holding registers for the local application
    pub fn holding_registers_mut(&mut self) -> &mut [u16] {
        self.holding_registers.as_mut_slice()
    }

    /// mutable access to the input registers for the local application
    pub fn input_registers_mut(&mut self) -> &mut [u16] {
        self.input_registers.as_mut_slice()
    }
}

fn writable(table: Table) -> Result<Table, StoreError> {
    if table.is_read_only() {
        return Err(StoreError::ReadOnly(table));
    }
    Ok(table)
}

fn checked_range(
    table: Table,
    capacity: usize,
    start: u16,
    count: usize,
) -> Result<Range<usize>, StoreError> {
    let begin = start as usize;
    match begin.checked_add(count) {
        Some(end) if end <= capacity => Ok(begin..end),
        _ => Err(StoreError::OutOfRange {
            table,
            start,
            count,
            capacity,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_store() -> RegisterStore {
        RegisterStore::create(StoreSizes::new(10, 10, 10, 10)).unwrap()
    }

    #[test]
    fn identity_seed_covers_every_holding_register() {
        let mut store = RegisterStore::create(StoreSizes::full()).unwrap();
        store.seed_identity_holding_registers();

        for i in 0..MAX_TABLE_SIZE {
            let values = store
                .read_registers(RegisterTable::HoldingRegisters, i as u16, 1)
                .unwrap();
            assert_eq!(values, &[i as u16]);
        }
    }

    #[test]
    fn seeding_leaves_the_other_tables_cleared() {
        let mut store = small_store();
        store.seed_identity_holding_registers();

        assert_eq!(store.read_bits(BitTable::Coils, 0, 10).unwrap(), &[false; 10]);
        assert_eq!(
            store.read_bits(BitTable::DiscreteInputs, 0, 10).unwrap(),
            &[false; 10]
        );
        assert_eq!(
            store
                .read_registers(RegisterTable::InputRegisters, 0, 10)
                .unwrap(),
            &[0; 10]
        );
    }

    #[test]
    fn rejects_tables_larger_than_the_address_space() {
        let err = RegisterStore::create(StoreSizes::new(10, 10, MAX_TABLE_SIZE + 1, 10))
            .err()
            .unwrap();
        assert_eq!(
            err,
            StoreError::Allocation {
                table: Table::HoldingRegisters,
                size: MAX_TABLE_SIZE + 1
            }
        );
    }

    #[test]
    fn empty_tables_are_allowed() {
        let store = RegisterStore::create(StoreSizes::new(0, 0, 0, 0)).unwrap();
        assert_eq!(store.capacity(Table::Coils), 0);
        assert!(store.read_bits(BitTable::Coils, 0, 1).is_err());
    }

    #[test]
    fn written_values_read_back_unchanged() {
        let mut store = small_store();

        store
            .write_registers(RegisterTable::HoldingRegisters, 7, &[0xCAFE, 0xBEEF, 0x0001])
            .unwrap();
        store
            .write_bits(BitTable::Coils, 0, &[true, false, true])
            .unwrap();

        assert_eq!(
            store
                .read_registers(RegisterTable::HoldingRegisters, 7, 3)
                .unwrap(),
            &[0xCAFE, 0xBEEF, 0x0001]
        );
        assert_eq!(
            store.read_bits(BitTable::Coils, 0, 3).unwrap(),
            &[true, false, true]
        );
    }

    #[test]
    fn range_ending_at_capacity_is_valid() {
        let store = small_store();
        assert_eq!(store.read_bits(BitTable::Coils, 9, 1).unwrap(), &[false]);
        assert!(store.read_bits(BitTable::Coils, 10, 0).unwrap().is_empty());
    }

    #[test]
    fn reports_the_size_of_each_table() {
        let sizes = StoreSizes::new(1, 2, 3, 0);
        let store = RegisterStore::create(sizes).unwrap();
        assert_eq!(store.sizes(), sizes);
        assert_eq!(store.capacity(Table::DiscreteInputs), 2);
        assert_eq!(
            RegisterStore::create(StoreSizes::full()).unwrap().sizes(),
            StoreSizes::full()
        );
    }

    #[test]
    fn only_coils_and_holding_registers_are_writable() {
        assert!(!Table::Coils.is_read_only());
        assert!(!Table::HoldingRegisters.is_read_only());
        assert!(Table::DiscreteInputs.is_read_only());
        assert!(Table::InputRegisters.is_read_only());
    }

    #[test]
    fn out_of_range_access_fails_and_leaves_table_unmodified() {
        let mut store = small_store();
        let before = store.clone();

        let expected = StoreError::OutOfRange {
            table: Table::HoldingRegisters,
            start: 8,
            count: 3,
            capacity: 10,
        };

        assert_eq!(
            store.read_registers(RegisterTable::HoldingRegisters, 8, 3),
            Err(expected)
        );
        assert_eq!(
            store.write_registers(RegisterTable::HoldingRegisters, 8, &[1, 2, 3]),
            Err(expected)
        );
        assert_eq!(
            store.write_bits(BitTable::Coils, 10, &[true]),
            Err(StoreError::OutOfRange {
                table: Table::Coils,
                start: 10,
                count: 1,
                capacity: 10,
            })
        );
        assert_eq!(store, before);
    }

    #[test]
    fn writes_to_read_only_tables_fail_and_leave_table_unmodified() {
        let mut store = small_store();
        let before = store.clone();

        assert_eq!(
            store.write_bits(BitTable::DiscreteInputs, 0, &[true]),
            Err(StoreError::ReadOnly(Table::DiscreteInputs))
        );
        assert_eq!(
            store.write_registers(RegisterTable::InputRegisters, 0, &[1]),
            Err(StoreError::ReadOnly(Table::InputRegisters))
        );
        // read-only takes precedence over the range check
        assert_eq!(
            store.write_registers(RegisterTable::InputRegisters, 100, &[1]),
            Err(StoreError::ReadOnly(Table::InputRegisters))
        );
        assert_eq!(store, before);
    }

    #[test]
    fn local_application_can_update_read_only_tables() {
        let mut store = small_store();
        store.input_registers_mut()[3] = 42;
        store.discrete_inputs_mut()[4] = true;

        assert_eq!(
            store
                .read_registers(RegisterTable::InputRegisters, 3, 1)
                .unwrap(),
            &[42]
        );
        assert_eq!(
            store.read_bits(BitTable::DiscreteInputs, 4, 1).unwrap(),
            &[true]
        );
    }

    #[test]
    fn mask_write_combines_masks_with_current_value() {
        let mut store = small_store();
        store.holding_registers_mut()[4] = 0x0012;

        // example values from the application protocol specification
        assert_eq!(store.mask_write_register(4, 0x00F2, 0x0025), Ok(0x0017));
        assert_eq!(
            store
                .read_registers(RegisterTable::HoldingRegisters, 4, 1)
                .unwrap(),
            &[0x0017]
        );
        assert!(store.mask_write_register(10, 0xFFFF, 0).is_err());
    }
}
