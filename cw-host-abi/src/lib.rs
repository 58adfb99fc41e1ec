#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AbiFunction {
    pub index: u16,
    pub name: &'static str,
    pub arity: u8,
}

pub const ABI_VERSION: u16 = 1;

pub const FN_REF_INCREMENT: u16 = 0;
pub const FN_REF_DECREMENT: u16 = 1;
pub const FN_RAW_UNREGISTER: u16 = 2;
pub const FN_CALL_SET_RESULT: u16 = 3;
pub const FN_MEMORY_ON_GROW: u16 = 4;

pub const FUNCTIONS: [AbiFunction; 5] = [
    AbiFunction {
        index: FN_REF_INCREMENT,
        name: "ref::increment",
        arity: 1,
    },
    AbiFunction {
        index: FN_REF_DECREMENT,
        name: "ref::decrement",
        arity: 1,
    },
    AbiFunction {
        index: FN_RAW_UNREGISTER,
        name: "raw::unregister",
        arity: 1,
    },
    AbiFunction {
        index: FN_CALL_SET_RESULT,
        name: "call::set_result",
        arity: 1,
    },
    AbiFunction {
        index: FN_MEMORY_ON_GROW,
        name: "memory::on_grow",
        arity: 0,
    },
];

pub const BRIDGE_FUNCTION_COUNT: u16 = FUNCTIONS.len() as u16;

// Export names a guest image must provide for the host to drive its allocator
// and indirect function table.
pub const EXPORT_ALLOCATE: &str = "__bridge_alloc";
pub const EXPORT_DEALLOCATE: &str = "__bridge_free";
pub const EXPORT_FUNCTION_TABLE: &str = "__bridge_table";

fn functions_by_name() -> &'static std::collections::HashMap<&'static str, &'static AbiFunction> {
    static LOOKUP: std::sync::OnceLock<
        std::collections::HashMap<&'static str, &'static AbiFunction>,
    > = std::sync::OnceLock::new();
    LOOKUP.get_or_init(|| {
        let mut map = std::collections::HashMap::with_capacity(FUNCTIONS.len());
        for function in FUNCTIONS.iter() {
            map.insert(function.name, function);
        }
        map
    })
}

pub fn function_by_index(index: u16) -> Option<&'static AbiFunction> {
    FUNCTIONS.iter().find(|function| function.index == index)
}

pub fn function_by_name(name: &str) -> Option<&'static AbiFunction> {
    functions_by_name().get(name).copied()
}

pub fn abi_json() -> &'static str {
    include_str!("../abi.json")
}
