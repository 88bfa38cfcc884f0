// document constants
pub const DOC_ID: &str = "_id";
pub const ID_FIELD: &str = "id";
pub const VERSION_FIELD: &str = "version";
pub const FIELD_SEPARATOR: &str = ".";
pub const INITIAL_VERSION: i64 = 0;

// comparison operators
pub const OP_EQ: &str = "$eq";
pub const OP_NE: &str = "$ne";
pub const OP_GT: &str = "$gt";
pub const OP_GTE: &str = "$gte";
pub const OP_LT: &str = "$lt";
pub const OP_LTE: &str = "$lte";
pub const OP_IN: &str = "$in";
pub const OP_NIN: &str = "$nin";

// logical operators
pub const OP_AND: &str = "$and";
pub const OP_OR: &str = "$or";
pub const OP_NOR: &str = "$nor";

// update operators
pub const UPDATE_SET: &str = "$set";
pub const UPDATE_INC: &str = "$inc";
pub const UPDATE_UNSET: &str = "$unset";

// pipeline stages
pub const STAGE_MATCH: &str = "$match";
pub const STAGE_PROJECT: &str = "$project";
pub const STAGE_GROUP: &str = "$group";
pub const STAGE_SORT: &str = "$sort";
pub const STAGE_SKIP: &str = "$skip";
pub const STAGE_LIMIT: &str = "$limit";

// group accumulators
pub const ACC_SUM: &str = "$sum";
pub const ACC_AVG: &str = "$avg";
pub const ACC_MIN: &str = "$min";
pub const ACC_MAX: &str = "$max";
pub const ACC_FIRST: &str = "$first";
pub const ACC_LAST: &str = "$last";
pub const ACC_PUSH: &str = "$push";
pub const ACC_COUNT: &str = "$count";

/// Field reference prefix used by pipeline expressions, as in `"$amount"`.
pub const FIELD_REF_PREFIX: char = '$';
