use fxhash::FxBuildHasher;
use indexmap::IndexMap;

/// Primitive operations, carrying their wire numbers. A node is a list whose
/// head cell is a `Num` holding one of these values; anything else is an
/// invalid opcode at evaluation time.
///
/// The numbering is sparse: 20–32 are the numeric binary operators (handled
/// as one group by the dispatch loop), and `Intersect` is reserved but
/// unimplemented.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum Opcode {
    Quote = 1,
    Eq = 2,
    NotEq = 3,
    Cond = 5,
    Loop = 6,
    Eval = 7,
    Do = 10,
    Let = 11,
    Get = 12,
    Set = 13,

    Add = 20,
    Sub = 21,
    Mul = 22,
    Div = 23,
    Rem = 24,
    Mod = 25,
    And = 26,
    Or = 27,
    Xor = 28,
    LessThan = 29,
    GreaterThan = 30,
    GreaterEqual = 31,
    LessEqual = 32,

    Not = 35,

    Debug = 67,

    Len = 71,
    GetList = 72,
    SetList = 73,
    Sublist = 74,
    Intersect = 75,
}

/// Opcode number emitted by the parser for keywords it does not recognize.
/// Not in the opcode table, so evaluating it panics with `InvalidOpc`.
pub const UNKNOWN_KEYWORD: i64 = 66;

impl Opcode {

    pub fn as_num(self) -> i64 {
        self as i64
    }

    pub fn from_num(num: i64) -> Option<Opcode> {
        use Opcode::*;
        match num {
            1 => Some(Quote),
            2 => Some(Eq),
            3 => Some(NotEq),
            5 => Some(Cond),
            6 => Some(Loop),
            7 => Some(Eval),
            10 => Some(Do),
            11 => Some(Let),
            12 => Some(Get),
            13 => Some(Set),
            20 => Some(Add),
            21 => Some(Sub),
            22 => Some(Mul),
            23 => Some(Div),
            24 => Some(Rem),
            25 => Some(Mod),
            26 => Some(And),
            27 => Some(Or),
            28 => Some(Xor),
            29 => Some(LessThan),
            30 => Some(GreaterThan),
            31 => Some(GreaterEqual),
            32 => Some(LessEqual),
            35 => Some(Not),
            67 => Some(Debug),
            71 => Some(Len),
            72 => Some(GetList),
            73 => Some(SetList),
            74 => Some(Sublist),
            75 => Some(Intersect),
            _ => None,
        }
    }

    pub fn is_numeric_binary(self) -> bool {
        use Opcode::*;
        matches!(self, Add | Sub | Mul | Div | Rem | Mod | And | Or | Xor
            | LessThan | GreaterThan | GreaterEqual | LessEqual)
    }
}

/// The keyword table: every name the reader accepts, in a stable order (the
/// CLI help prints the keys as the language's vocabulary).
pub fn keywords() -> IndexMap<&'static str, Opcode, FxBuildHasher> {
    use Opcode::*;
    let mut kws: IndexMap<&'static str, Opcode, FxBuildHasher> = IndexMap::with_capacity_and_hasher(30, FxBuildHasher::default());
    for (name, op) in [
        ("+", Add),
        ("-", Sub),
        ("/", Div),
        ("*", Mul),
        ("%", Mod),
        ("#", Len),
        ("remainder", Rem),
        ("sublist", Sublist),
        ("getl", GetList),
        ("setl", SetList),
        ("intersect", Intersect),
        ("debug", Debug),
        ("set", Set),
        ("get", Get),
        ("cond", Cond),
        ("loop", Loop),
        ("eval", Eval),
        ("quote", Quote),
        ("do", Do),
        ("=", Eq),
        ("!=", NotEq),
        (">", GreaterThan),
        ("<", LessThan),
        ("<=", LessEqual),
        (">=", GreaterEqual),
        ("and", And),
        ("xor", Xor),
        ("or", Or),
        ("not", Not),
        ("let", Let),
    ] {
        kws.insert(name, op);
    }
    kws
}
