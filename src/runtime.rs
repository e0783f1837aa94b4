//! Runtime interface for emitted code.
//!
//! The emitter writes C source against a stable runtime helper surface; the
//! prelude below declares that surface so any C-capable backend can compile
//! the buffer. The backend itself is a collaborator consumed by interface:
//! it receives the source plus the function-name map and hands back a
//! callable entry point.

use std::collections::HashMap;
use std::error::Error;
use std::fmt::{self, Display, Formatter};

/// C prelude emitted at the top of every transpiled script: the tagged-item
/// typedefs and the extern declarations for every runtime helper family the
/// emitter references.
pub const RUNTIME_PRELUDE: &str = r#"// lambda runtime interface
#include <stdint.h>
#include <stdbool.h>

typedef uint64_t Item;
typedef struct Context {
    uintptr_t stack_limit;
    bool run_main;
} Context;
typedef struct String {
    uint32_t len;
    char chars[];
} String;
typedef struct Decimal Decimal;
typedef struct DateTime DateTime;
typedef struct Range {
    uint8_t type_id;
    long start;
    long end;
} Range;
typedef struct List {
    uint8_t type_id;
    Item* items;
    int64_t length;
    int64_t capacity;
} List;
typedef struct Array {
    uint8_t type_id;
    Item* items;
    int64_t length;
} Array;
typedef struct ArrayInt {
    uint8_t type_id;
    int32_t* items;
    int64_t length;
} ArrayInt;
typedef struct ArrayInt64 {
    uint8_t type_id;
    int64_t* items;
    int64_t length;
} ArrayInt64;
typedef struct ArrayFloat {
    uint8_t type_id;
    double* items;
    int64_t length;
} ArrayFloat;
typedef struct ArrayList {
    void** data;
    int64_t length;
} ArrayList;
typedef struct Map Map;
typedef struct Element Element;
typedef struct Function Function;
typedef struct Pattern Pattern;
typedef struct Type Type;
typedef uint8_t TypeId;

enum {
    LMD_TYPE_NULL, LMD_TYPE_BOOL, LMD_TYPE_INT, LMD_TYPE_INT64, LMD_TYPE_FLOAT,
    LMD_TYPE_NUMBER, LMD_TYPE_DECIMAL, LMD_TYPE_DTIME, LMD_TYPE_STRING,
    LMD_TYPE_SYMBOL, LMD_TYPE_BINARY, LMD_TYPE_LIST, LMD_TYPE_RANGE,
    LMD_TYPE_ARRAY_INT, LMD_TYPE_ARRAY_INT64, LMD_TYPE_ARRAY_FLOAT,
    LMD_TYPE_ARRAY, LMD_TYPE_MAP, LMD_TYPE_ELEMENT, LMD_TYPE_TYPE,
    LMD_TYPE_FUNC, LMD_TYPE_PATTERN, LMD_TYPE_ANY, LMD_TYPE_ERROR
};

#define null ((void*)0)
#define ITEM_NULL ((Item)0)
#define ITEM_ERROR ((Item)1)
#define ItemError ITEM_ERROR

// boxing
extern Item i2it(int32_t v);
extern Item l2it(int64_t* v);
extern Item d2it(double* v);
extern Item b2it(bool v);
extern Item s2it(String* s);
extern Item y2it(String* s);
extern Item x2it(String* s);
extern Item k2it(DateTime* d);
extern Item c2it(Decimal* d);
extern Item push_l(int64_t v);
extern Item push_d(double v);
extern Item push_k(DateTime* d);

// unboxing
extern int32_t it2i(Item it);
extern int64_t it2l(Item it);
extern double it2f(Item it);
extern bool it2b(Item it);
extern String* it2s(Item it);
extern Decimal* it2d(Item it);

// arithmetic
extern Item fn_add(Item a, Item b);
extern Item fn_sub(Item a, Item b);
extern Item fn_mul(Item a, Item b);
extern Item fn_div(Item a, Item b);
extern Item fn_idiv(Item a, Item b);
extern Item fn_mod(Item a, Item b);
extern Item fn_pow(Item a, Item b);
extern Item fn_neg(Item a);
extern Item fn_pos(Item a);

// logical and comparison (bool-returning)
extern bool fn_and(Item a, Item b);
extern bool fn_or(Item a, Item b);
extern bool fn_not(Item a);
extern bool op_and(bool a, bool b);
extern bool op_or(bool a, bool b);
extern bool fn_eq(Item a, Item b);
extern bool fn_ne(Item a, Item b);
extern bool fn_lt(Item a, Item b);
extern bool fn_le(Item a, Item b);
extern bool fn_gt(Item a, Item b);
extern bool fn_ge(Item a, Item b);
extern bool is_truthy(Item it);

// containment and ranges
extern bool fn_is(Item a, Item b);
extern bool fn_in(Item a, Item b);
extern Range* fn_to(Item a, Item b);
extern Item fn_join(Item a, Item b);

// constructors
extern Array* array(void);
extern Array* array_spreadable(void);
extern ArrayInt* array_int(void);
extern ArrayInt64* array_int64(void);
extern ArrayFloat* array_float(void);
extern Item array_fill(Array* a, int count, ...);
extern Item array_int_fill(ArrayInt* a, int count, ...);
extern Item array_int64_fill(ArrayInt64* a, int count, ...);
extern Item array_float_fill(ArrayFloat* a, int count, ...);
extern void array_push(Array* a, Item it);
extern void array_push_spread(Array* a, Item it);
extern Item array_end(Array* a);
extern List* list(void);
// list filling also serves element content, hence void*
extern Item list_fill(void* l, int count, ...);
extern void list_push(void* l, Item it);
extern void list_push_spread(void* l, Item it);
extern Item list_end(void* l);
extern Map* map(int type_index);
extern Item map_fill(Map* m, ...);
extern Element* elmt(int type_index);
extern Item elmt_fill(Element* e, ...);

// for-expression clause transforms (pair-encoded spreadable arrays)
extern Array* fn_order(Array* pairs, int key_count, const char* dirs);
extern Item fn_group(Array* pairs, int key_count);
extern Array* fn_slice(Array* a, Item offset, Item limit);
extern String* fn_string(Item it);

// access
extern Item array_get(Array* a, int index);
extern int32_t array_int_get(ArrayInt* a, int index);
extern int64_t array_int64_get(ArrayInt64* a, int index);
extern double array_float_get(ArrayFloat* a, int index);
extern Item list_get(List* l, int index);
extern Item map_get(Map* m, Item key);
extern Item elmt_get(Element* e, Item key);
extern Item fn_index(Item it, Item key);
extern Item fn_member(Item it, Item key);
extern int64_t fn_len(Item it);
extern Item item_at(Item it, int index);
extern Item item_attr(Item it, const char* name);
extern ArrayList* item_keys(Item it);
extern TypeId item_type_id(Item it);

// paths
extern Item fn_path(Item text);
extern Item fn_path_index(Item base, Item segment);

// built-ins (overloaded names carry the call arity)
extern Item fn_sum(Item it);
extern Item fn_avg(Item it);
extern Item fn_abs(Item it);
extern double fn_round(Item it);
extern double fn_floor(Item it);
extern double fn_ceil(Item it);
extern String* fn_symbol(Item it);
extern int64_t fn_int(Item it);
extern double fn_float(Item it);
extern Item fn_number(Item it);
extern Item fn_type(Item it);
extern String* fn_format();
extern Item fn_error(Item it);
extern bool fn_match(Item value, Item pattern);
extern bool fn_contains(Item a, Item b);
extern Item fn_min1(Item a);
extern Item fn_min2(Item a, Item b);
extern Item fn_min3(Item a, Item b, Item c);
extern Item fn_max1(Item a);
extern Item fn_max2(Item a, Item b);
extern Item fn_max3(Item a, Item b, Item c);
extern Item fn_slice2(Item a, Item b);
extern Item fn_slice3(Item a, Item b, Item c);
extern Item pn_print();
extern Item pn_input();

// function values
extern Function* to_fn_named(void* ptr, int arity, const char* name);
extern Function* to_closure_named(void* ptr, int arity, void* env, const char* name);
extern Item fn_call(Function* f, List* args);
extern Item fn_call0(Function* f);
extern Item fn_call1(Function* f, Item a0);
extern Item fn_call2(Function* f, Item a0, Item a1);
extern Item fn_call3(Function* f, Item a0, Item a1, Item a2);
extern Item fn_pipe_call(Item data, Item f);
extern void set_vargs(List* vargs);

// constants
extern String* const_s(int index);
extern DateTime* const_k(int index);
extern Item const_s2it(int index);
extern Item const_y2it(int index);
extern Item const_x2it(int index);
extern Item const_k2it(int index);
extern Item const_c2it(int index);
extern Item const_l2it(int index);
extern Item const_d2it(int index);
extern Pattern* const_pattern(int index);
extern Item base_type(int type_id);
extern Item const_type(int index);

// memory
extern void* heap_calloc(long size, int flags);
"#;

/// Stack overflow protection block appended after the prelude. The check
/// compares a local marker address against the context's cached limit.
pub const STACK_CHECK_DEFINE: &str = r#"
// Stack overflow protection declarations
extern void lambda_stack_overflow_error(const char* func_name);

#define LAMBDA_STACK_CHECK(func_name) \
    { \
        volatile char _stack_marker; \
        if ((uintptr_t)&_stack_marker < rt->stack_limit) { \
            lambda_stack_overflow_error(func_name); \
            return ITEM_ERROR; \
        } \
    }
"#;

/// Error from the external backend.
#[derive(Clone, Debug)]
pub struct BackendError {
    pub message: String,
}

impl Display for BackendError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "backend error: {}", self.message)
    }
}

impl Error for BackendError {}

/// The native compiler consumed by the pipeline: takes emitted source plus
/// the symbol→display-name map and produces a callable module. The core
/// never implements this; hosts plug in their JIT.
pub trait Backend {
    type Module;

    fn compile(
        &mut self,
        source: &str,
        func_names: &HashMap<String, String>,
    ) -> Result<Self::Module, BackendError>;
}
