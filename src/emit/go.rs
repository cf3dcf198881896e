//! Go emitter for the server and client targets.
//!
//! Both targets render through the same code path; only the `package` line
//! differs. Each planned message gets `MarshalJSON`/`UnmarshalJSON` that run
//! `protojson` as the baseline and then rewrite a `map[string]json.RawMessage`,
//! plus exported `Encode<Msg>WireJSON`/`Decode<Msg>WireJSON` so messages in
//! other files and packages can delegate to each other.

use std::collections::{BTreeMap, BTreeSet};

use super::{pascal_case, EmitContext, Emitter, GeneratedFile, GENERATED_BY};
use crate::index::{ResolvedFile, ResolvedMessage};
use crate::plan::{EncodingPlan, EnumName, FieldTransform, OneofVariant, TransformKind, TransformTag};
use crate::types::{BytesEncoding, EmptyBehavior, Target, TimestampFormat};

const PROTOJSON_IMPORT: &str = "google.golang.org/protobuf/encoding/protojson";

pub struct GoEmitter {
    target: Target,
}

impl GoEmitter {
    pub fn new(target: Target) -> Self {
        Self { target }
    }

    fn package_name(&self, ctx: &EmitContext<'_>, file: &ResolvedFile) -> String {
        let label = match self.target {
            Target::GoClient => ctx.options.client_package.clone(),
            _ => ctx.options.server_package.clone(),
        };
        label.unwrap_or_else(|| file.go_package_name())
    }
}

impl Emitter for GoEmitter {
    fn target(&self) -> Target {
        self.target
    }

    fn supports(&self, _tag: TransformTag) -> bool {
        true
    }

    fn emit_file(&self, ctx: &EmitContext<'_>, file: &ResolvedFile) -> Option<GeneratedFile> {
        let planned: Vec<(&ResolvedMessage, &EncodingPlan)> = ctx
            .index
            .messages_in(file)
            .filter_map(|m| ctx.plans.get(&m.full_name).map(|p| (m, p)))
            .collect();
        if planned.is_empty() {
            return None;
        }

        let mut unit = GoUnit::new(ctx, file);
        for (message, plan) in &planned {
            unit.message(message, plan);
        }

        Some(GeneratedFile {
            target: self.target,
            name: format!("{}_wire.pb.go", file.prefix()),
            content: unit.finish(&self.package_name(ctx, file)),
        })
    }
}

/// Indents Go source by brace depth, the way gofmt would.
#[derive(Default)]
struct GoPrinter {
    out: String,
    depth: usize,
}

impl GoPrinter {
    fn line(&mut self, text: &str) {
        let t = text.trim();
        if t.is_empty() {
            self.out.push('\n');
            return;
        }
        if t.starts_with('}') || t.starts_with(')') {
            self.depth = self.depth.saturating_sub(1);
        }
        let depth = if t.starts_with("case ") || t == "default:" {
            self.depth.saturating_sub(1)
        } else {
            self.depth
        };
        for _ in 0..depth {
            self.out.push('\t');
        }
        self.out.push_str(t);
        self.out.push('\n');
        if t.ends_with('{') || t.ends_with('(') {
            self.depth += 1;
        }
    }

    fn block(&mut self, text: &str) {
        for l in text.lines() {
            self.line(l);
        }
    }
}

/// Shared runtime helpers, emitted once per file when referenced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Helper {
    Each,
    IsNull,
    IsEmptyObject,
    Int64Encode,
    Int64Decode,
    EnumEncode,
    EnumDecode,
    EnumToNumber,
    EnumFromNumber,
    TimestampEncode,
    TimestampDecode,
    BytesEncode,
    BytesDecode,
    UnwrapValue,
    WrapValue,
}

impl Helper {
    fn requires(self) -> &'static [Helper] {
        match self {
            Helper::Each => &[Helper::IsNull],
            _ => &[],
        }
    }

    fn imports(self) -> &'static [&'static str] {
        match self {
            Helper::Each => &["encoding/json", "fmt"],
            Helper::IsNull => &["bytes"],
            Helper::IsEmptyObject => &["encoding/json"],
            Helper::Int64Encode => &["encoding/json", "strconv"],
            Helper::Int64Decode => &["bytes", "encoding/json", "fmt", "strconv"],
            Helper::EnumDecode => &["encoding/json", "fmt"],
            Helper::EnumEncode | Helper::EnumToNumber | Helper::EnumFromNumber => {
                &["encoding/json"]
            }
            Helper::TimestampEncode | Helper::TimestampDecode => &["encoding/json", "time"],
            Helper::BytesEncode | Helper::BytesDecode => {
                &["encoding/base64", "encoding/hex", "encoding/json"]
            }
            Helper::UnwrapValue | Helper::WrapValue => &["encoding/json"],
        }
    }

    /// Go source; `{p}` is replaced by the per-file helper prefix.
    fn source(self) -> &'static str {
        match self {
            Helper::Each => r#"
// {p}Each applies fn to the value at key, to each list element or to each map value.
func {p}Each(raw map[string]json.RawMessage, key string, container string, fn func([]byte) ([]byte, error)) error {
v, ok := raw[key]
if !ok || {p}IsNull(v) {
return nil
}
switch container {
case "list":
var items []json.RawMessage
if err := json.Unmarshal(v, &items); err != nil {
return fmt.Errorf("%s: %w", key, err)
}
for i, item := range items {
if {p}IsNull(item) {
continue
}
out, err := fn(item)
if err != nil {
return fmt.Errorf("%s[%d]: %w", key, i, err)
}
items[i] = out
}
out, err := json.Marshal(items)
if err != nil {
return err
}
raw[key] = out
case "map":
var entries map[string]json.RawMessage
if err := json.Unmarshal(v, &entries); err != nil {
return fmt.Errorf("%s: %w", key, err)
}
for k, item := range entries {
if {p}IsNull(item) {
continue
}
out, err := fn(item)
if err != nil {
return fmt.Errorf("%s[%q]: %w", key, k, err)
}
entries[k] = out
}
out, err := json.Marshal(entries)
if err != nil {
return err
}
raw[key] = out
default:
out, err := fn(v)
if err != nil {
return fmt.Errorf("%s: %w", key, err)
}
raw[key] = out
}
return nil
}
"#,
            Helper::IsNull => r#"
func {p}IsNull(v []byte) bool {
return bytes.Equal(bytes.TrimSpace(v), []byte("null"))
}
"#,
            Helper::IsEmptyObject => r#"
func {p}IsEmptyObject(v []byte) bool {
var obj map[string]json.RawMessage
return json.Unmarshal(v, &obj) == nil && obj != nil && len(obj) == 0
}
"#,
            Helper::Int64Encode => r#"
// {p}Int64Encode turns protojson's quoted 64-bit integers into JSON numbers.
func {p}Int64Encode(unsigned bool) func([]byte) ([]byte, error) {
return func(v []byte) ([]byte, error) {
var s string
if err := json.Unmarshal(v, &s); err != nil {
return v, nil
}
if unsigned {
if _, err := strconv.ParseUint(s, 10, 64); err != nil {
return nil, err
}
} else if _, err := strconv.ParseInt(s, 10, 64); err != nil {
return nil, err
}
return []byte(s), nil
}
}
"#,
            Helper::Int64Decode => r#"
func {p}Int64Decode(v []byte) ([]byte, error) {
trimmed := bytes.TrimSpace(v)
if len(trimmed) > 0 && trimmed[0] == '"' {
return v, nil
}
s := string(trimmed)
if _, err := strconv.ParseInt(s, 10, 64); err != nil {
if _, uerr := strconv.ParseUint(s, 10, 64); uerr != nil {
return nil, fmt.Errorf("%s is not a 64-bit integer", s)
}
}
return json.Marshal(s)
}
"#,
            Helper::EnumEncode => r#"
func {p}EnumEncode(names map[string]string) func([]byte) ([]byte, error) {
return func(v []byte) ([]byte, error) {
var s string
if err := json.Unmarshal(v, &s); err != nil {
return v, nil
}
if name, ok := names[s]; ok {
return json.Marshal(name)
}
return v, nil
}
}
"#,
            Helper::EnumDecode => r#"
func {p}EnumDecode(values map[string]string) func([]byte) ([]byte, error) {
return func(v []byte) ([]byte, error) {
var s string
if err := json.Unmarshal(v, &s); err != nil {
return v, nil
}
name, ok := values[s]
if !ok {
return nil, fmt.Errorf("unknown enum value %q", s)
}
return json.Marshal(name)
}
}
"#,
            Helper::EnumToNumber => r#"
func {p}EnumToNumber(numbers map[string]int32) func([]byte) ([]byte, error) {
return func(v []byte) ([]byte, error) {
var s string
if err := json.Unmarshal(v, &s); err != nil {
return v, nil
}
if n, ok := numbers[s]; ok {
return json.Marshal(n)
}
return v, nil
}
}
"#,
            Helper::EnumFromNumber => r#"
func {p}EnumFromNumber(names map[int32]string) func([]byte) ([]byte, error) {
return func(v []byte) ([]byte, error) {
var n int32
if err := json.Unmarshal(v, &n); err != nil {
return v, nil
}
if name, ok := names[n]; ok {
return json.Marshal(name)
}
return v, nil
}
}
"#,
            Helper::TimestampEncode => r#"
// {p}TimestampEncode re-expresses an RFC 3339 timestamp. Sub-unit precision is dropped.
func {p}TimestampEncode(format string) func([]byte) ([]byte, error) {
return func(v []byte) ([]byte, error) {
var s string
if err := json.Unmarshal(v, &s); err != nil {
return nil, err
}
t, err := time.Parse(time.RFC3339Nano, s)
if err != nil {
return nil, err
}
switch format {
case "unix_seconds":
return json.Marshal(t.Unix())
case "unix_millis":
return json.Marshal(t.UnixMilli())
default:
return json.Marshal(t.UTC().Format("2006-01-02"))
}
}
}
"#,
            Helper::TimestampDecode => r#"
func {p}TimestampDecode(format string) func([]byte) ([]byte, error) {
return func(v []byte) ([]byte, error) {
var t time.Time
switch format {
case "unix_seconds", "unix_millis":
var n int64
if err := json.Unmarshal(v, &n); err != nil {
return nil, err
}
if format == "unix_seconds" {
t = time.Unix(n, 0)
} else {
t = time.UnixMilli(n)
}
default:
var s string
if err := json.Unmarshal(v, &s); err != nil {
return nil, err
}
d, err := time.Parse("2006-01-02", s)
if err != nil {
return nil, err
}
t = d
}
return json.Marshal(t.UTC().Format(time.RFC3339Nano))
}
}
"#,
            Helper::BytesEncode => r#"
func {p}BytesEncode(encoding string) func([]byte) ([]byte, error) {
return func(v []byte) ([]byte, error) {
var s string
if err := json.Unmarshal(v, &s); err != nil {
return nil, err
}
b, err := base64.StdEncoding.DecodeString(s)
if err != nil {
return nil, err
}
switch encoding {
case "hex":
return json.Marshal(hex.EncodeToString(b))
case "base64_raw":
return json.Marshal(base64.RawStdEncoding.EncodeToString(b))
case "base64url":
return json.Marshal(base64.URLEncoding.EncodeToString(b))
default:
return json.Marshal(base64.RawURLEncoding.EncodeToString(b))
}
}
}
"#,
            Helper::BytesDecode => r#"
func {p}BytesDecode(encoding string) func([]byte) ([]byte, error) {
return func(v []byte) ([]byte, error) {
var s string
if err := json.Unmarshal(v, &s); err != nil {
return nil, err
}
var b []byte
var err error
switch encoding {
case "hex":
b, err = hex.DecodeString(s)
case "base64_raw":
b, err = base64.RawStdEncoding.DecodeString(s)
case "base64url":
b, err = base64.URLEncoding.DecodeString(s)
default:
b, err = base64.RawURLEncoding.DecodeString(s)
}
if err != nil {
return nil, err
}
return json.Marshal(base64.StdEncoding.EncodeToString(b))
}
}
"#,
            Helper::UnwrapValue => r#"
// {p}UnwrapValue replaces a map value object by its list field.
func {p}UnwrapValue(field string) func([]byte) ([]byte, error) {
return func(v []byte) ([]byte, error) {
var obj map[string]json.RawMessage
if err := json.Unmarshal(v, &obj); err != nil {
return nil, err
}
if items, ok := obj[field]; ok {
return items, nil
}
return []byte("[]"), nil
}
}
"#,
            Helper::WrapValue => r#"
func {p}WrapValue(field string) func([]byte) ([]byte, error) {
return func(v []byte) ([]byte, error) {
var items []json.RawMessage
if err := json.Unmarshal(v, &items); err != nil {
return nil, err
}
if len(items) == 0 {
return []byte("{}"), nil
}
return json.Marshal(map[string]json.RawMessage{field: v})
}
}
"#,
        }
    }
}

/// One generated Go file under construction.
struct GoUnit<'c> {
    ctx: &'c EmitContext<'c>,
    file: &'c ResolvedFile,
    /// Per-file prefix of helper and table identifiers.
    prefix: String,
    body: GoPrinter,
    helpers: BTreeSet<Helper>,
    /// Import path to alias, for messages in other Go packages.
    aliases: BTreeMap<String, String>,
    /// Table identifier to its Go source.
    tables: BTreeMap<String, String>,
    /// Standard library imports used by inline statements.
    imports: BTreeSet<&'static str>,
}

impl<'c> GoUnit<'c> {
    fn new(ctx: &'c EmitContext<'c>, file: &'c ResolvedFile) -> Self {
        Self {
            ctx,
            file,
            prefix: format!("wire{}", pascal_case(file.prefix())),
            body: GoPrinter::default(),
            helpers: BTreeSet::new(),
            aliases: BTreeMap::new(),
            tables: BTreeMap::new(),
            imports: BTreeSet::new(),
        }
    }

    fn use_helper(&mut self, helper: Helper) -> String {
        self.helpers.insert(helper);
        for dep in helper.requires() {
            self.helpers.insert(*dep);
        }
        format!("{}{:?}", self.prefix, helper)
    }

    fn message(&mut self, message: &ResolvedMessage, plan: &EncodingPlan) {
        let ident = message.ident();
        let encode = format!("Encode{}WireJSON", ident);
        let decode = format!("Decode{}WireJSON", ident);

        self.body.block(&format!(
            r#"
// MarshalJSON writes {ident} in its wire format.
func (x *{ident}) MarshalJSON() ([]byte, error) {{
if x == nil {{
return []byte("null"), nil
}}
data, err := protojson.Marshal(x)
if err != nil {{
return nil, err
}}
return {encode}(data)
}}

// UnmarshalJSON reads {ident} from its wire format.
func (x *{ident}) UnmarshalJSON(data []byte) error {{
baseline, err := {decode}(data)
if err != nil {{
return err
}}
return protojson.Unmarshal(baseline, x)
}}
"#
        ));

        // Encode
        self.body.block(&format!(
            r#"
// {encode} rewrites protojson output for {ident} into the wire format.
func {encode}(data []byte) ([]byte, error) {{
var raw map[string]json.RawMessage
if err := json.Unmarshal(data, &raw); err != nil {{
return nil, err
}}
if raw == nil {{
raw = map[string]json.RawMessage{{}}
}}"#
        ));
        for t in &plan.transforms {
            if t.kind.is_root_unwrap() {
                let empty = if matches!(t.kind, TransformKind::Unwrap { is_map: true, .. }) {
                    "{}"
                } else {
                    "[]"
                };
                self.body.block(&format!(
                    "if v, ok := raw[{key}]; ok {{\nreturn v, nil\n}}\nreturn []byte(\"{empty}\"), nil\n}}",
                    key = go_string(&t.json_name)
                ));
                break;
            }
            self.encode_step(t);
        }
        if plan.root_unwrap().is_none() {
            self.body.block("return json.Marshal(raw)\n}");
        }

        // Decode
        self.body.block(&format!(
            "\n// {decode} rewrites the wire format of {ident} back into protojson input.\nfunc {decode}(data []byte) ([]byte, error) {{"
        ));
        match plan.root_unwrap() {
            Some(root) => {
                let is_null = self.use_helper(Helper::IsNull);
                let probe = if matches!(root.kind, TransformKind::Unwrap { is_map: true, .. }) {
                    "map[string]json.RawMessage"
                } else {
                    "[]json.RawMessage"
                };
                self.body.block(&format!(
                    r#"raw := map[string]json.RawMessage{{}}
if !{is_null}(data) {{
var probe {probe}
if err := json.Unmarshal(data, &probe); err != nil {{
return nil, err
}}
if len(probe) > 0 {{
raw[{key}] = data
}}
}}"#,
                    key = go_string(&root.json_name)
                ));
            }
            None => self.body.block(
                r#"var raw map[string]json.RawMessage
if err := json.Unmarshal(data, &raw); err != nil {
return nil, err
}
if raw == nil {
raw = map[string]json.RawMessage{}
}"#,
            ),
        }
        for t in plan.transforms.iter().rev() {
            if !t.kind.is_root_unwrap() {
                self.decode_step(t);
            }
        }
        self.body.block("return json.Marshal(raw)\n}");
    }

    fn encode_step(&mut self, t: &FieldTransform) {
        let key = go_string(&t.json_name);
        match &t.kind {
            TransformKind::EmptyValueAs { behavior } => {
                let is_empty = self.use_helper(Helper::IsEmptyObject);
                let action = match behavior {
                    EmptyBehavior::Omit => format!("delete(raw, {key})"),
                    _ => format!("raw[{key}] = json.RawMessage(\"null\")"),
                };
                self.body.block(&format!(
                    "if v, ok := raw[{key}]; ok && {is_empty}(v) {{\n{action}\n}}"
                ));
            }
            TransformKind::Nullable => {
                self.body.block(&format!(
                    "if _, ok := raw[{key}]; !ok {{\nraw[{key}] = json.RawMessage(\"null\")\n}}"
                ));
            }
            TransformKind::Flatten { prefix, .. } => {
                let is_null = self.use_helper(Helper::IsNull);
                self.body.block(&format!(
                    r#"if v, ok := raw[{key}]; ok {{
delete(raw, {key})
if !{is_null}(v) {{
var child map[string]json.RawMessage
if err := json.Unmarshal(v, &child); err != nil {{
return nil, err
}}
for k, cv := range child {{
raw[{lifted}] = cv
}}
}}
}}"#,
                    lifted = prefixed_key(prefix)
                ));
            }
            TransformKind::OneofDiscriminator { flatten, variants, .. } => {
                self.oneof_encode(&key, *flatten, variants);
            }
            TransformKind::Unwrap { is_root: true, .. } => {}
            _ => {
                let func = self.value_func(t, true);
                self.each(t, &func);
            }
        }
    }

    /// The first set variant writes its value under the discriminator.
    fn oneof_encode(&mut self, key: &str, flatten: bool, variants: &[OneofVariant]) {
        let is_null = self.use_helper(Helper::IsNull);
        self.imports.insert("fmt");
        for (i, variant) in variants.iter().enumerate() {
            let member = go_string(&variant.json_name);
            let open = if i == 0 { "if" } else { "} else if" };
            self.body
                .line(&format!("{open} v, ok := raw[{member}]; ok && !{is_null}(v) {{"));
            if flatten {
                self.body.block(&format!(
                    r#"delete(raw, {member})
var child map[string]json.RawMessage
if err := json.Unmarshal(v, &child); err != nil {{
return nil, fmt.Errorf("%s: %w", {member}, err)
}}
for k, cv := range child {{
raw[k] = cv
}}"#
                ));
            }
            let tag = serde_json::Value::String(variant.value.clone()).to_string();
            self.body
                .line(&format!("raw[{key}] = json.RawMessage({})", go_string(&tag)));
        }
        if !variants.is_empty() {
            self.body.line("}");
        }
    }

    /// The discriminator picks the variant; flattened keys are gathered back.
    fn oneof_decode(&mut self, key: &str, flatten: bool, variants: &[OneofVariant]) {
        let is_null = self.use_helper(Helper::IsNull);
        self.imports.insert("fmt");
        self.body.block(&format!(
            r#"if v, ok := raw[{key}]; ok {{
delete(raw, {key})
if !{is_null}(v) {{
var tag string
if err := json.Unmarshal(v, &tag); err != nil {{
return nil, fmt.Errorf("%s: %w", {key}, err)
}}
switch tag {{"#
        ));
        for variant in variants {
            self.body.line(&format!("case {}:", go_string(&variant.value)));
            if flatten {
                let keys: Vec<String> = variant.child_keys.iter().map(|k| go_string(k)).collect();
                self.body.block(&format!(
                    r#"child := map[string]json.RawMessage{{}}
for _, k := range []string{{{keys}}} {{
if cv, ok := raw[k]; ok {{
child[k] = cv
delete(raw, k)
}}
}}
cb, err := json.Marshal(child)
if err != nil {{
return nil, err
}}
raw[{member}] = cb"#,
                    keys = keys.join(", "),
                    member = go_string(&variant.json_name)
                ));
            }
        }
        self.body.block(&format!(
            r#"default:
return nil, fmt.Errorf("unknown %s value %q", {key}, tag)
}}
}}
}}"#
        ));
    }

    fn decode_step(&mut self, t: &FieldTransform) {
        let key = go_string(&t.json_name);
        match &t.kind {
            TransformKind::EmptyValueAs { behavior } => {
                // OMIT leaves nothing to restore: absent decodes as unset.
                if *behavior == EmptyBehavior::Null {
                    let is_null = self.use_helper(Helper::IsNull);
                    self.body.block(&format!(
                        "if v, ok := raw[{key}]; ok && {is_null}(v) {{\nraw[{key}] = json.RawMessage(\"{{}}\")\n}}"
                    ));
                }
            }
            TransformKind::Nullable => {
                let is_null = self.use_helper(Helper::IsNull);
                self.body.block(&format!(
                    "if v, ok := raw[{key}]; ok && {is_null}(v) {{\ndelete(raw, {key})\n}}"
                ));
            }
            TransformKind::Flatten {
                prefix, child_keys, ..
            } => {
                let keys: Vec<String> = child_keys.iter().map(|k| go_string(k)).collect();
                self.body.block(&format!(
                    r#"{{
child := map[string]json.RawMessage{{}}
for _, k := range []string{{{keys}}} {{
if v, ok := raw[{lifted}]; ok {{
child[k] = v
delete(raw, {lifted})
}}
}}
if len(child) > 0 {{
v, err := json.Marshal(child)
if err != nil {{
return nil, err
}}
raw[{key}] = v
}}
}}"#,
                    keys = keys.join(", "),
                    lifted = prefixed_key(prefix)
                ));
            }
            TransformKind::OneofDiscriminator { flatten, variants, .. } => {
                self.oneof_decode(&key, *flatten, variants);
            }
            TransformKind::Unwrap { is_root: true, .. } => {}
            _ => {
                let func = self.value_func(t, false);
                self.each(t, &func);
            }
        }
    }

    fn each(&mut self, t: &FieldTransform, func: &str) {
        let each = self.use_helper(Helper::Each);
        let container = match t.container {
            crate::plan::Container::Single => "single",
            crate::plan::Container::List => "list",
            crate::plan::Container::MapValues => "map",
        };
        self.body.block(&format!(
            "if err := {each}(raw, {key}, \"{container}\", {func}); err != nil {{\nreturn nil, err\n}}",
            key = go_string(&t.json_name)
        ));
    }

    /// Go expression of type `func([]byte) ([]byte, error)` for one value.
    fn value_func(&mut self, t: &FieldTransform, encode: bool) -> String {
        match &t.kind {
            TransformKind::Nested { message_type } => self.nested_func(message_type, encode),
            TransformKind::Unwrap {
                value_field: Some(inner),
                ..
            } => {
                let helper = if encode {
                    Helper::UnwrapValue
                } else {
                    Helper::WrapValue
                };
                format!("{}({})", self.use_helper(helper), go_string(inner))
            }
            TransformKind::IntegerAsNumber { unsigned } => {
                if encode {
                    format!("{}({})", self.use_helper(Helper::Int64Encode), unsigned)
                } else {
                    self.use_helper(Helper::Int64Decode)
                }
            }
            TransformKind::EnumCustomNames { enum_type, table } => {
                let names = self.string_table(enum_type, "Names", table, |e| (&e.name, &e.wire));
                if encode {
                    format!("{}({})", self.use_helper(Helper::EnumEncode), names)
                } else {
                    // Proto names decode too.
                    let mut inverse: Vec<EnumName> = table
                        .iter()
                        .map(|e| EnumName {
                            name: e.wire.clone(),
                            number: e.number,
                            wire: e.name.clone(),
                        })
                        .collect();
                    let wires: BTreeSet<&str> = table.iter().map(|e| e.wire.as_str()).collect();
                    inverse.extend(table.iter().filter(|e| !wires.contains(e.name.as_str())).map(|e| EnumName {
                        name: e.name.clone(),
                        number: e.number,
                        wire: e.name.clone(),
                    }));
                    let values =
                        self.string_table(enum_type, "Values", &inverse, |e| (&e.name, &e.wire));
                    format!("{}({})", self.use_helper(Helper::EnumDecode), values)
                }
            }
            TransformKind::EnumAsNumber { enum_type, values } => {
                let id = format!("{}{}", self.prefix, pascal_case(enum_type));
                if encode {
                    let name = format!("{}Numbers", id);
                    let entries: String = values
                        .iter()
                        .map(|e| format!("{}: {},\n", go_string(&e.name), e.number))
                        .collect();
                    self.tables.insert(
                        name.clone(),
                        format!("var {name} = map[string]int32{{\n{entries}}}"),
                    );
                    format!("{}({})", self.use_helper(Helper::EnumToNumber), name)
                } else {
                    let name = format!("{}ByNumber", id);
                    let mut seen = BTreeSet::new();
                    let entries: String = values
                        .iter()
                        .filter(|e| seen.insert(e.number))
                        .map(|e| format!("{}: {},\n", e.number, go_string(&e.name)))
                        .collect();
                    self.tables.insert(
                        name.clone(),
                        format!("var {name} = map[int32]string{{\n{entries}}}"),
                    );
                    format!("{}({})", self.use_helper(Helper::EnumFromNumber), name)
                }
            }
            TransformKind::TimestampAs { format } => {
                let helper = if encode {
                    Helper::TimestampEncode
                } else {
                    Helper::TimestampDecode
                };
                format!("{}(\"{}\")", self.use_helper(helper), timestamp_mode(*format))
            }
            TransformKind::BytesAs { encoding } => {
                let helper = if encode {
                    Helper::BytesEncode
                } else {
                    Helper::BytesDecode
                };
                format!("{}(\"{}\")", self.use_helper(helper), bytes_mode(*encoding))
            }
            // Handled as statements by the callers.
            TransformKind::Unwrap { .. }
            | TransformKind::Nullable
            | TransformKind::EmptyValueAs { .. }
            | TransformKind::Flatten { .. }
            | TransformKind::OneofDiscriminator { .. } => String::new(),
        }
    }

    fn nested_func(&mut self, message_type: &str, encode: bool) -> String {
        let verb = if encode { "Encode" } else { "Decode" };
        let Some(target) = self.ctx.index.message(message_type) else {
            return format!("{}{}WireJSON", verb, pascal_case(message_type));
        };
        let func = format!("{}{}WireJSON", verb, target.ident());

        let here = self.file.go_import_path();
        let there = self
            .ctx
            .index
            .file(&target.file)
            .and_then(|f| f.go_import_path().map(|p| (p, f.go_package_name())));
        match (here, there) {
            (Some(here), Some((path, name))) if here != path => {
                let taken: BTreeSet<&String> = self.aliases.values().collect();
                let alias = match self.aliases.get(path) {
                    Some(alias) => alias.clone(),
                    None => {
                        let mut alias = name.clone();
                        let mut n = 2;
                        while taken.contains(&alias) {
                            alias = format!("{}{}", name, n);
                            n += 1;
                        }
                        alias
                    }
                };
                self.aliases.insert(path.to_string(), alias.clone());
                format!("{}.{}", alias, func)
            }
            _ => func,
        }
    }

    fn string_table(
        &mut self,
        enum_type: &str,
        suffix: &str,
        entries: &[EnumName],
        pair: impl Fn(&EnumName) -> (&String, &String),
    ) -> String {
        let name = format!("{}{}{}", self.prefix, pascal_case(enum_type), suffix);
        let body: String = entries
            .iter()
            .map(|e| {
                let (k, v) = pair(e);
                format!("{}: {},\n", go_string(k), go_string(v))
            })
            .collect();
        self.tables.insert(
            name.clone(),
            format!("var {name} = map[string]string{{\n{body}}}"),
        );
        name
    }

    fn finish(mut self, package: &str) -> String {
        let mut imports: BTreeSet<&str> = BTreeSet::new();
        imports.insert("encoding/json");
        imports.extend(self.imports.iter().copied());
        for helper in &self.helpers {
            imports.extend(helper.imports());
        }

        let mut out = GoPrinter::default();
        out.line(&format!("// {}", GENERATED_BY));
        out.line(&format!("// source: {}", self.file.name));
        out.line("");
        out.line(&format!("package {}", package));
        out.line("");
        out.line("import (");
        for path in &imports {
            out.line(&go_string(path));
        }
        out.line("");
        out.line(&go_string(PROTOJSON_IMPORT));
        for (path, alias) in &self.aliases {
            out.line(&format!("{} {}", alias, go_string(path)));
        }
        out.line(")");

        out.out.push_str(&std::mem::take(&mut self.body.out));

        for table in self.tables.values() {
            out.line("");
            out.block(table);
        }
        for helper in &self.helpers {
            out.block(&helper.source().replace("{p}", &self.prefix));
        }
        out.out
    }
}

fn go_string(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Go expression for `k` with the flatten prefix applied.
fn prefixed_key(prefix: &str) -> String {
    if prefix.is_empty() {
        "k".to_string()
    } else {
        format!("{}+k", go_string(prefix))
    }
}

fn timestamp_mode(format: TimestampFormat) -> &'static str {
    match format {
        TimestampFormat::UnixSeconds => "unix_seconds",
        TimestampFormat::UnixMillis => "unix_millis",
        _ => "date",
    }
}

fn bytes_mode(encoding: BytesEncoding) -> &'static str {
    match encoding {
        BytesEncoding::Hex => "hex",
        BytesEncoding::Base64Raw => "base64_raw",
        BytesEncoding::Base64Url => "base64url",
        _ => "base64url_raw",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::FileDescriptorSet;
    use crate::index::GlobalIndex;
    use crate::plan::build_plans;
    use crate::types::GenerateOptions;
    use serde_json::{json, Value};

    fn emit(files: Value, options: GenerateOptions, target: Target) -> Vec<GeneratedFile> {
        let set: FileDescriptorSet = serde_json::from_value(json!({ "file": files })).unwrap();
        let index = GlobalIndex::build(&set, &[], &options).unwrap();
        let plans = build_plans(&index);
        let ctx = EmitContext {
            index: &index,
            plans: &plans,
            options: &options,
        };
        let emitter = GoEmitter::new(target);
        index
            .targets()
            .filter_map(|f| emitter.emit_file(&ctx, f))
            .collect()
    }

    fn shop_file() -> Value {
        json!({
            "name": "shop/order.proto",
            "package": "shop",
            "options": {"goPackage": "example.com/gen/shop;shop"},
            "messageType": [
                {"name": "Order", "field": [
                    {"name": "id", "number": 1, "label": "LABEL_OPTIONAL", "type": "TYPE_INT64",
                     "options": {"[sebuf.http.int64_encoding]": "NUMBER"}},
                    {"name": "digest", "number": 2, "label": "LABEL_OPTIONAL", "type": "TYPE_BYTES",
                     "options": {"[sebuf.http.bytes_encoding]": "HEX"}}
                ]},
                {"name": "Plain", "field": [
                    {"name": "name", "number": 1, "label": "LABEL_OPTIONAL", "type": "TYPE_STRING"}
                ]}
            ]
        })
    }

    #[test]
    fn renders_overrides_for_planned_messages_only() {
        let files = emit(json!([shop_file()]), GenerateOptions::new(), Target::GoServer);
        assert_eq!(files.len(), 1);
        let go = &files[0];
        assert_eq!(go.name, "shop/order_wire.pb.go");
        assert!(go.content.starts_with("// Code generated by protowire. DO NOT EDIT.\n// source: shop/order.proto\n\npackage shop\n"));
        assert!(go.content.contains("func (x *Order) MarshalJSON() ([]byte, error) {\n\tif x == nil {\n\t\treturn []byte(\"null\"), nil\n\t}"));
        assert!(go.content.contains("func EncodeOrderWireJSON(data []byte) ([]byte, error) {"));
        assert!(go.content.contains("wireShopOrderEach(raw, \"id\", \"single\", wireShopOrderInt64Encode(false))"));
        assert!(go.content.contains("wireShopOrderEach(raw, \"digest\", \"single\", wireShopOrderBytesDecode(\"hex\"))"));
        assert!(go.content.contains("\"encoding/hex\""));
        assert!(!go.content.contains("\"time\""));
        assert!(!go.content.contains("*Plain"));
    }

    #[test]
    fn server_and_client_differ_only_in_package() {
        let options = GenerateOptions::new()
            .server_package("shopserver")
            .client_package("shopclient");
        let server = emit(json!([shop_file()]), options.clone(), Target::GoServer);
        let client = emit(json!([shop_file()]), options, Target::GoClient);

        let server = server[0].content.replace("package shopserver\n", "package X\n");
        let client = client[0].content.replace("package shopclient\n", "package X\n");
        assert_eq!(server, client);
    }

    #[test]
    fn root_unwrap_returns_the_field_value() {
        let file = json!({
            "name": "list.proto",
            "package": "l",
            "messageType": [
                {"name": "Item", "field": [{"name": "id", "number": 1, "label": "LABEL_OPTIONAL", "type": "TYPE_STRING"}]},
                {"name": "ItemList", "field": [
                    {"name": "items", "number": 1, "label": "LABEL_REPEATED", "type": "TYPE_MESSAGE",
                     "typeName": ".l.Item", "options": {"[sebuf.http.unwrap]": true}}
                ]}
            ]
        });
        let files = emit(json!([file]), GenerateOptions::new(), Target::GoClient);
        let go = &files[0].content;
        assert!(go.contains("package l\n"));
        assert!(go.contains("\tif v, ok := raw[\"items\"]; ok {\n\t\treturn v, nil\n\t}\n\treturn []byte(\"[]\"), nil\n}"));
        assert!(go.contains("var probe []json.RawMessage"));
    }

    #[test]
    fn nested_message_in_other_package_uses_alias() {
        let common = json!({
            "name": "common/money.proto",
            "package": "common",
            "options": {"goPackage": "example.com/gen/common"},
            "messageType": [{"name": "Money", "field": [
                {"name": "units", "number": 1, "label": "LABEL_OPTIONAL", "type": "TYPE_INT64",
                 "options": {"[sebuf.http.int64_encoding]": "NUMBER"}}
            ]}]
        });
        let order = json!({
            "name": "shop/cart.proto",
            "package": "shop",
            "dependency": ["common/money.proto"],
            "options": {"goPackage": "example.com/gen/shop"},
            "messageType": [{"name": "Cart", "field": [
                {"name": "totals", "number": 1, "label": "LABEL_REPEATED", "type": "TYPE_MESSAGE", "typeName": ".common.Money"}
            ]}]
        });
        let files = emit(json!([common, order]), GenerateOptions::new(), Target::GoServer);
        let cart = files.iter().find(|f| f.name == "shop/cart_wire.pb.go").unwrap();
        assert!(cart.content.contains("\tcommon \"example.com/gen/common\"\n"));
        assert!(cart.content.contains("wireShopCartEach(raw, \"totals\", \"list\", common.EncodeMoneyWireJSON)"));
    }

    #[test]
    fn enum_tables_are_emitted() {
        let file = json!({
            "name": "s.proto",
            "package": "s",
            "messageType": [{"name": "M", "field": [
                {"name": "status", "number": 1, "label": "LABEL_OPTIONAL", "type": "TYPE_ENUM", "typeName": ".s.Status"}
            ]}],
            "enumType": [{"name": "Status", "value": [
                {"name": "STATUS_UNSPECIFIED", "number": 0, "options": {"[sebuf.http.enum_value]": "unknown"}},
                {"name": "STATUS_ACTIVE", "number": 1, "options": {"[sebuf.http.enum_value]": "active"}}
            ]}]
        });
        let files = emit(json!([file]), GenerateOptions::new(), Target::GoServer);
        let go = &files[0].content;
        assert!(go.contains("var wireSSStatusNames = map[string]string{\n\t\"STATUS_UNSPECIFIED\": \"unknown\",\n\t\"STATUS_ACTIVE\": \"active\",\n}"));
        assert!(go.contains("\t\"active\": \"STATUS_ACTIVE\",\n"));
        assert!(go.contains("\t\"STATUS_ACTIVE\": \"STATUS_ACTIVE\",\n"));
    }

    #[test]
    fn discriminated_oneof_statements() {
        let file = json!({
            "name": "pay.proto",
            "package": "pay",
            "messageType": [
                {"name": "Card", "field": [{"name": "last4", "number": 1, "label": "LABEL_OPTIONAL", "type": "TYPE_STRING"}]},
                {"name": "Payment", "field": [
                    {"name": "card", "number": 1, "label": "LABEL_OPTIONAL", "type": "TYPE_MESSAGE", "typeName": ".pay.Card",
                     "oneofIndex": 0, "options": {"[sebuf.http.oneof_value]": "credit_card"}}
                ], "oneofDecl": [{"name": "method", "options": {
                    "[sebuf.http.oneof_config]": {"discriminator": "type", "flatten": true}
                }}]}
            ]
        });
        let files = emit(json!([file]), GenerateOptions::new(), Target::GoServer);
        let go = &files[0].content;
        assert!(go.contains("\tif v, ok := raw[\"card\"]; ok && !wirePayIsNull(v) {\n\t\tdelete(raw, \"card\")\n"));
        assert!(go.contains("\t\traw[\"type\"] = json.RawMessage(\"\\\"credit_card\\\"\")\n\t}\n"));
        assert!(go.contains("\t\t\tswitch tag {\n\t\t\tcase \"credit_card\":\n\t\t\t\tchild := map[string]json.RawMessage{}\n"));
        assert!(go.contains("for _, k := range []string{\"last4\"} {"));
        assert!(go.contains("return nil, fmt.Errorf(\"unknown %s value %q\", \"type\", tag)"));
        assert!(go.contains("\t\"fmt\"\n"));
    }

    #[test]
    fn printer_indents_by_braces() {
        let mut p = GoPrinter::default();
        p.block("func f() {\nswitch x {\ncase 1:\nreturn\ndefault:\n}\n}");
        assert_eq!(p.out, "func f() {\n\tswitch x {\n\tcase 1:\n\t\treturn\n\tdefault:\n\t}\n}\n");
    }
}
