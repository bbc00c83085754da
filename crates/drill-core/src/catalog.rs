//! Built-in exercise catalogue.
//!
//! Four tracks: algorithms (hash maps, two pointers, sliding window, graphs,
//! dynamic programming, heaps), data-frame manipulation over the `table`
//! helper, statistics/ML metrics, and SQL over a fixed two-table schema.
//!
//! Every reference answer is computed in Rust from its own materialised
//! fixture, except `pair-sum` whose expected value is fixed.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use crate::domain::{Exercise, Helper, ResultSlot, Table, Value};
use crate::equivalence::Comparator;
use crate::fixture::{FixtureContext, FixtureSpec};

/// All built-in exercises, in presentation order.
pub fn builtin() -> Vec<Exercise> {
    vec![
        pair_sum(),
        valid_anagram(),
        contains_duplicate(),
        valid_parentheses(),
        container_most_water(),
        longest_substring(),
        number_of_islands(),
        climbing_stairs(),
        merge_sorted_lists(),
        array_intersection(),
        employee_filter(),
        category_stats(),
        rolling_mean(),
        outlier_removal(),
        log_loss(),
        t_statistic(),
        sample_size(),
        sql_high_earners(),
        sql_total_sales(),
        sql_salary_rank(),
        sql_running_total(),
    ]
}

/// The fixed schema shared by every query exercise.
pub fn sql_schema() -> FixtureSpec {
    let employees = Table::new(
        vec!["id".into(), "name".into(), "department".into(), "salary".into()],
        [
            (1, "Alice", "HR", 60_000),
            (2, "Bob", "Engineering", 120_000),
            (3, "Charlie", "Engineering", 130_000),
            (4, "David", "HR", 65_000),
            (5, "Eve", "Marketing", 90_000),
            (6, "Frank", "Marketing", 85_000),
        ]
        .into_iter()
        .map(|(id, name, dept, salary)| {
            vec![
                Value::Int(id),
                Value::from(name),
                Value::from(dept),
                Value::Int(salary),
            ]
        })
        .collect(),
    );
    let sales = Table::new(
        vec!["id".into(), "employee_id".into(), "amount".into(), "date".into()],
        [
            (1, 2, 500, "2023-01-01"),
            (2, 2, 700, "2023-01-02"),
            (3, 3, 200, "2023-01-01"),
            (4, 5, 1000, "2023-01-05"),
            (5, 5, 500, "2023-01-06"),
        ]
        .into_iter()
        .map(|(id, employee, amount, date)| {
            vec![
                Value::Int(id),
                Value::Int(employee),
                Value::Int(amount),
                Value::from(date),
            ]
        })
        .collect(),
    );
    FixtureSpec::new()
        .with_table("employees", employees)
        .with_table("sales", sales)
}

// ---------------------------------------------------------------------------
// Fixture accessors for reference computations
// ---------------------------------------------------------------------------

fn get<'a>(ctx: &'a FixtureContext, name: &str) -> Result<&'a Value, String> {
    ctx.get(name).ok_or_else(|| format!("fixture '{name}' is missing"))
}

fn int(ctx: &FixtureContext, name: &str) -> Result<i64, String> {
    match get(ctx, name)? {
        Value::Int(i) => Ok(*i),
        other => Err(format!("fixture '{name}' is a {}, not an int", other.type_name())),
    }
}

fn float(ctx: &FixtureContext, name: &str) -> Result<f64, String> {
    get(ctx, name)?
        .as_f64()
        .ok_or_else(|| format!("fixture '{name}' is not a number"))
}

fn text<'a>(ctx: &'a FixtureContext, name: &str) -> Result<&'a str, String> {
    match get(ctx, name)? {
        Value::Str(s) => Ok(s),
        other => Err(format!("fixture '{name}' is a {}, not a str", other.type_name())),
    }
}

fn list<'a>(ctx: &'a FixtureContext, name: &str) -> Result<&'a [Value], String> {
    match get(ctx, name)? {
        Value::List(items) => Ok(items),
        other => Err(format!("fixture '{name}' is a {}, not a list", other.type_name())),
    }
}

fn ints(items: &[Value]) -> Result<Vec<i64>, String> {
    items
        .iter()
        .map(|v| match v {
            Value::Int(i) => Ok(*i),
            other => Err(format!("expected int element, got {}", other.type_name())),
        })
        .collect()
}

fn floats(items: &[Value]) -> Result<Vec<f64>, String> {
    items
        .iter()
        .map(|v| v.as_f64().ok_or_else(|| format!("expected number, got {}", v.type_name())))
        .collect()
}

fn cell<'a>(table: &'a Table, row: &'a [Value], column: &str) -> Result<&'a Value, String> {
    table
        .column_index(column)
        .and_then(|i| row.get(i))
        .ok_or_else(|| format!("column '{column}' is missing"))
}

fn cell_str<'a>(table: &'a Table, row: &'a [Value], column: &str) -> Result<&'a str, String> {
    match cell(table, row, column)? {
        Value::Str(s) => Ok(s),
        other => Err(format!("column '{column}' holds {}", other.type_name())),
    }
}

fn cell_f64(table: &Table, row: &[Value], column: &str) -> Result<f64, String> {
    cell(table, row, column)?
        .as_f64()
        .ok_or_else(|| format!("column '{column}' is not numeric"))
}

fn cell_int(table: &Table, row: &[Value], column: &str) -> Result<i64, String> {
    match cell(table, row, column)? {
        Value::Int(i) => Ok(*i),
        other => Err(format!("column '{column}' holds {}", other.type_name())),
    }
}

fn columns(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| (*n).to_string()).collect()
}

// ---------------------------------------------------------------------------
// Algorithms
// ---------------------------------------------------------------------------

fn pair_sum() -> Exercise {
    Exercise::scripted("pair-sum", ResultSlot::call("twoSum", &["nums", "target"]))
        .title("Two Sum")
        .prompt(
            "Given an array of integers `nums` and an integer `target`, return the \
             indices of the two numbers that add up to `target`, smaller index first. \
             Exactly one solution exists.",
        )
        .fixture(
            FixtureSpec::new()
                .with("nums", Value::int_list(&[2, 7, 11, 15]))
                .with("target", 9i64),
        )
        .expected(Value::int_list(&[0, 1]))
        .starter(
            r#"
            def twoSum(nums, target):
                pass
            "#,
        )
        .solution(
            r#"
            def twoSum(nums, target):
                prevMap = {}  # val -> index
                for i, n in enumerate(nums):
                    diff = target - n
                    if diff in prevMap:
                        return [prevMap[diff], i]
                    prevMap[n] = i
                return []
            "#,
        )
}

fn valid_anagram() -> Exercise {
    Exercise::scripted("valid-anagram", ResultSlot::call("isAnagram", &["s", "t"]))
        .title("Valid Anagram")
        .prompt("Return `True` if `t` is an anagram of `s`, and `False` otherwise.")
        .fixture(FixtureSpec::new().with("s", "anagram").with("t", "nagaram"))
        .reference(|ctx| {
            let mut s: Vec<char> = text(ctx, "s")?.chars().collect();
            let mut t: Vec<char> = text(ctx, "t")?.chars().collect();
            s.sort_unstable();
            t.sort_unstable();
            Ok(Value::Bool(s == t))
        })
        .starter(
            r#"
            def isAnagram(s, t):
                pass
            "#,
        )
        .solution(
            r#"
            def isAnagram(s, t):
                if len(s) != len(t):
                    return False
                countS, countT = {}, {}
                for i in range(len(s)):
                    countS[s[i]] = countS.get(s[i], 0) + 1
                    countT[t[i]] = countT.get(t[i], 0) + 1
                return countS == countT
            "#,
        )
}

fn contains_duplicate() -> Exercise {
    Exercise::scripted("contains-duplicate", ResultSlot::call("containsDuplicate", &["nums"]))
        .title("Contains Duplicate")
        .prompt(
            "Return `True` if any value appears at least twice in `nums`, and `False` \
             if every element is distinct.",
        )
        .fixture(FixtureSpec::new().with("nums", Value::int_list(&[1, 2, 3, 1])))
        .reference(|ctx| {
            let nums = ints(list(ctx, "nums")?)?;
            let mut seen = HashSet::new();
            Ok(Value::Bool(!nums.iter().all(|n| seen.insert(*n))))
        })
        .starter(
            r#"
            def containsDuplicate(nums):
                pass
            "#,
        )
        .solution(
            r#"
            def containsDuplicate(nums):
                hashset = set()
                for n in nums:
                    if n in hashset:
                        return True
                    hashset.add(n)
                return False
            "#,
        )
}

fn valid_parentheses() -> Exercise {
    Exercise::scripted("valid-parentheses", ResultSlot::call("isValid", &["s"]))
        .title("Valid Parentheses")
        .prompt(
            "Given a string `s` of the characters `()[]{}`, return `True` if every \
             bracket is closed by the same type of bracket in the correct order.",
        )
        .fixture(FixtureSpec::new().with("s", "()[]{}"))
        .reference(|ctx| {
            let mut stack = Vec::new();
            for c in text(ctx, "s")?.chars() {
                let open = match c {
                    ')' => '(',
                    ']' => '[',
                    '}' => '{',
                    other => {
                        stack.push(other);
                        continue;
                    }
                };
                if stack.pop() != Some(open) {
                    return Ok(Value::Bool(false));
                }
            }
            Ok(Value::Bool(stack.is_empty()))
        })
        .starter(
            r#"
            def isValid(s):
                pass
            "#,
        )
        .solution(
            r#"
            def isValid(s):
                stack = []
                closeToOpen = {")": "(", "]": "[", "}": "{"}
                for c in s:
                    if c in closeToOpen:
                        if stack and stack[-1] == closeToOpen[c]:
                            stack.pop()
                        else:
                            return False
                    else:
                        stack.append(c)
                return True if not stack else False
            "#,
        )
}

fn container_most_water() -> Exercise {
    Exercise::scripted("container-most-water", ResultSlot::call("maxArea", &["height"]))
        .title("Container With Most Water")
        .prompt(
            "Find two lines in `height` that, together with the x-axis, form the \
             container holding the most water. Return that amount.",
        )
        .fixture(FixtureSpec::new().with("height", Value::int_list(&[1, 8, 6, 2, 5, 4, 8, 3, 7])))
        .reference(|ctx| {
            let height = ints(list(ctx, "height")?)?;
            let mut best = 0;
            for l in 0..height.len() {
                for r in l + 1..height.len() {
                    best = best.max((r - l) as i64 * height[l].min(height[r]));
                }
            }
            Ok(Value::Int(best))
        })
        .starter(
            r#"
            def maxArea(height):
                pass
            "#,
        )
        .solution(
            r#"
            def maxArea(height):
                l, r = 0, len(height) - 1
                res = 0
                while l < r:
                    area = (r - l) * min(height[l], height[r])
                    res = max(res, area)
                    if height[l] < height[r]:
                        l += 1
                    else:
                        r -= 1
                return res
            "#,
        )
}

fn longest_substring() -> Exercise {
    Exercise::scripted(
        "longest-substring",
        ResultSlot::call("lengthOfLongestSubstring", &["s"]),
    )
    .title("Longest Substring Without Repeating Characters")
    .prompt("Return the length of the longest substring of `s` without repeating characters.")
    .fixture(FixtureSpec::new().with("s", "abcabcbb"))
    .reference(|ctx| {
        let chars: Vec<char> = text(ctx, "s")?.chars().collect();
        let mut best = 0usize;
        let mut left = 0usize;
        let mut last: HashMap<char, usize> = HashMap::new();
        for (right, c) in chars.iter().enumerate() {
            if let Some(&prev) = last.get(c) {
                left = left.max(prev + 1);
            }
            last.insert(*c, right);
            best = best.max(right + 1 - left);
        }
        Ok(Value::Int(best as i64))
    })
    .starter(
        r#"
        def lengthOfLongestSubstring(s):
            pass
        "#,
    )
    .solution(
        r#"
        def lengthOfLongestSubstring(s):
            charSet = set()
            l = 0
            res = 0
            for r in range(len(s)):
                while s[r] in charSet:
                    charSet.remove(s[l])
                    l += 1
                charSet.add(s[r])
                res = max(res, r - l + 1)
            return res
        "#,
    )
}

fn number_of_islands() -> Exercise {
    let grid = Value::List(
        ["11000", "11000", "00100", "00011"]
            .iter()
            .map(|row| Value::List(row.chars().map(|c| Value::Str(c.to_string())).collect()))
            .collect(),
    );
    Exercise::scripted("number-of-islands", ResultSlot::call("numIslands", &["grid"]))
        .title("Number of Islands")
        .prompt(
            "Given a 2D grid of '1' (land) and '0' (water), return the number of \
             islands. An island is land connected horizontally or vertically.",
        )
        .helpers(&[Helper::Collections])
        .fixture(FixtureSpec::new().with("grid", grid))
        .reference(|ctx| {
            let grid: Vec<Vec<bool>> = list(ctx, "grid")?
                .iter()
                .map(|row| match row {
                    Value::List(cells) => Ok(cells
                        .iter()
                        .map(|c| matches!(c, Value::Str(s) if s == "1"))
                        .collect()),
                    other => Err(format!("grid row is a {}", other.type_name())),
                })
                .collect::<Result<_, String>>()?;
            let mut seen = HashSet::new();
            let mut islands = 0;
            for r in 0..grid.len() {
                for c in 0..grid[r].len() {
                    if !grid[r][c] || !seen.insert((r, c)) {
                        continue;
                    }
                    islands += 1;
                    let mut queue = VecDeque::from([(r, c)]);
                    while let Some((row, col)) = queue.pop_front() {
                        let neighbours = [
                            (row + 1, col),
                            (row.wrapping_sub(1), col),
                            (row, col + 1),
                            (row, col.wrapping_sub(1)),
                        ];
                        for (nr, nc) in neighbours {
                            let land = grid.get(nr).and_then(|g| g.get(nc)).copied().unwrap_or(false);
                            if land && seen.insert((nr, nc)) {
                                queue.push_back((nr, nc));
                            }
                        }
                    }
                }
            }
            Ok(Value::Int(islands))
        })
        .starter(
            r#"
            import collections

            def numIslands(grid):
                pass
            "#,
        )
        .solution(
            r#"
            import collections

            def numIslands(grid):
                if not grid: return 0

                rows, cols = len(grid), len(grid[0])
                visit = set()
                islands = 0

                def bfs(r, c):
                    q = collections.deque()
                    visit.add((r, c))
                    q.append((r, c))
                    while q:
                        row, col = q.popleft()
                        directions = [[1, 0], [-1, 0], [0, 1], [0, -1]]
                        for dr, dc in directions:
                            r_new, c_new = row + dr, col + dc
                            if (r_new in range(rows) and
                                    c_new in range(cols) and
                                    grid[r_new][c_new] == "1" and
                                    (r_new, c_new) not in visit):
                                q.append((r_new, c_new))
                                visit.add((r_new, c_new))

                for r in range(rows):
                    for c in range(cols):
                        if grid[r][c] == "1" and (r, c) not in visit:
                            bfs(r, c)
                            islands += 1
                return islands
            "#,
        )
}

fn climbing_stairs() -> Exercise {
    Exercise::scripted("climbing-stairs", ResultSlot::call("climbStairs", &["n"]))
        .title("Climbing Stairs")
        .prompt(
            "It takes `n` steps to reach the top and each move climbs 1 or 2 steps. \
             In how many distinct ways can you reach the top?",
        )
        .fixture(FixtureSpec::new().with("n", 5i64))
        .reference(|ctx| {
            let n = int(ctx, "n")?;
            let (mut one, mut two) = (1i64, 1i64);
            for _ in 1..n {
                let next = one
                    .checked_add(two)
                    .ok_or_else(|| "overflow".to_string())?;
                two = one;
                one = next;
            }
            Ok(Value::Int(one))
        })
        .starter(
            r#"
            def climbStairs(n):
                pass
            "#,
        )
        .solution(
            r#"
            def climbStairs(n):
                one, two = 1, 1
                for i in range(n - 1):
                    temp = one
                    one = one + two
                    two = temp
                return one
            "#,
        )
}

fn merge_sorted_lists() -> Exercise {
    let lists = Value::List(vec![
        Value::int_list(&[1, 4, 5]),
        Value::int_list(&[1, 3, 4]),
        Value::int_list(&[2, 6]),
    ]);
    Exercise::scripted("merge-sorted-lists", ResultSlot::call("mergeKLists", &["lists"]))
        .title("Merge K Sorted Lists")
        .prompt(
            "`lists` holds `k` ascending lists. Merge them into one ascending list \
             using a min-heap.",
        )
        .helpers(&[Helper::Heapq])
        .fixture(FixtureSpec::new().with("lists", lists))
        .reference(|ctx| {
            let mut merged = Vec::new();
            for item in list(ctx, "lists")? {
                match item {
                    Value::List(inner) => merged.extend(ints(inner)?),
                    other => return Err(format!("expected list of lists, got {}", other.type_name())),
                }
            }
            merged.sort_unstable();
            Ok(Value::int_list(&merged))
        })
        .starter(
            r#"
            import heapq

            def mergeKLists(lists):
                pass
            "#,
        )
        .solution(
            r#"
            import heapq

            def mergeKLists(lists):
                minHeap = []
                for i, l in enumerate(lists):
                    if l:
                        minHeap.append((l[0], i, 0))
                heapq.heapify(minHeap)

                merged = []
                while minHeap:
                    val, i, j = heapq.heappop(minHeap)
                    merged.append(val)
                    if j + 1 < len(lists[i]):
                        heapq.heappush(minHeap, (lists[i][j + 1], i, j + 1))
                return merged
            "#,
        )
}

fn array_intersection() -> Exercise {
    Exercise::scripted(
        "array-intersection",
        ResultSlot::call("intersection", &["nums1", "nums2"]),
    )
    .title("Intersection of Two Arrays")
    .prompt("Return the distinct values present in both `nums1` and `nums2`, in any order.")
    .fixture(
        FixtureSpec::new()
            .with("nums1", Value::int_list(&[4, 9, 5]))
            .with("nums2", Value::int_list(&[9, 4, 9, 8, 4])),
    )
    .reference(|ctx| {
        let a: HashSet<i64> = ints(list(ctx, "nums1")?)?.into_iter().collect();
        let b: HashSet<i64> = ints(list(ctx, "nums2")?)?.into_iter().collect();
        let mut both: Vec<i64> = a.intersection(&b).copied().collect();
        both.sort_unstable();
        Ok(Value::int_list(&both))
    })
    .comparator(Comparator::SetEquivalence { multiset: true })
    .starter(
        r#"
        def intersection(nums1, nums2):
            pass
        "#,
    )
    .solution(
        r#"
        def intersection(nums1, nums2):
            return list(set(nums1) & set(nums2))
        "#,
    )
}

// ---------------------------------------------------------------------------
// Data frames
// ---------------------------------------------------------------------------

fn employee_filter() -> Exercise {
    let df = Table::new(
        columns(&["name", "age", "city", "salary"]),
        [
            ("Alice", 25, "New York", 70_000),
            ("Bob", 30, "Los Angeles", 80_000),
            ("Charlie", 35, "New York", 120_000),
            ("David", 40, "Chicago", 90_000),
        ]
        .into_iter()
        .map(|(name, age, city, salary)| {
            vec![
                Value::from(name),
                Value::Int(age),
                Value::from(city),
                Value::Int(salary),
            ]
        })
        .collect(),
    );
    Exercise::scripted("employee-filter", ResultSlot::binding("result"))
        .title("Employee Filtering")
        .prompt(
            "Given the table `df`, keep employees who live in 'New York' and earn more \
             than 100,000. Assign a table with the same columns to `result`.",
        )
        .helpers(&[Helper::Table])
        .fixture(FixtureSpec::new().with_table("df", df))
        .reference(|ctx| {
            let df = ctx.table("df")?;
            let mut rows = Vec::new();
            for row in &df.rows {
                if cell_str(df, row, "city")? == "New York" && cell_f64(df, row, "salary")? > 100_000.0 {
                    rows.push(row.clone());
                }
            }
            Ok(Value::Table(Table::new(df.columns.clone(), rows)))
        })
        .comparator(Comparator::tabular_sorted_by(&["name"]))
        .starter(
            r#"
            from table import table

            result = df
            "#,
        )
        .solution(
            r#"
            from table import table

            rows = [
                [r["name"], r["age"], r["city"], r["salary"]]
                for r in df
                if r["city"] == "New York" and r["salary"] > 100000
            ]
            result = table(df.columns, rows)
            "#,
        )
}

fn category_stats() -> Exercise {
    let df = Table::new(
        columns(&["A", "Category"]),
        [
            (0.5, "A"),
            (-1.2, "B"),
            (1.5, "A"),
            (0.3, "B"),
            (2.1, "A"),
            (-0.7, "C"),
        ]
        .into_iter()
        .map(|(a, category)| vec![Value::Float(a), Value::from(category)])
        .collect(),
    );
    Exercise::scripted("category-stats", ResultSlot::binding("result"))
        .title("Category Stats")
        .prompt(
            "Group `df` by 'Category' and compute the mean and sum of column 'A'. \
             Assign a table with columns `Category`, `mean`, `sum` to `result`.",
        )
        .helpers(&[Helper::Table])
        .fixture(FixtureSpec::new().with_table("df", df))
        .reference(|ctx| {
            let df = ctx.table("df")?;
            let mut groups: BTreeMap<String, Vec<f64>> = BTreeMap::new();
            for row in &df.rows {
                groups
                    .entry(cell_str(df, row, "Category")?.to_string())
                    .or_default()
                    .push(cell_f64(df, row, "A")?);
            }
            let rows = groups
                .into_iter()
                .map(|(category, values)| {
                    let sum: f64 = values.iter().sum();
                    vec![
                        Value::Str(category),
                        Value::Float(sum / values.len() as f64),
                        Value::Float(sum),
                    ]
                })
                .collect();
            Ok(Value::Table(Table::new(columns(&["Category", "mean", "sum"]), rows)))
        })
        .comparator(Comparator::tabular_sorted_by(&["Category"]))
        .starter(
            r#"
            from table import table

            result = table(["Category", "mean", "sum"], [])
            "#,
        )
        .solution(
            r#"
            from table import table

            groups = {}
            for row in df:
                groups.setdefault(row["Category"], []).append(row["A"])

            rows = []
            for category in sorted(groups):
                values = groups[category]
                rows.append([category, sum(values) / len(values), sum(values)])
            result = table(["Category", "mean", "sum"], rows)
            "#,
        )
}

fn rolling_mean() -> Exercise {
    let df = Table::new(
        columns(&["date", "B"]),
        [
            ("2023-01-03", 1.5),
            ("2023-01-01", 0.2),
            ("2023-01-06", -0.4),
            ("2023-01-02", 0.9),
            ("2023-01-05", 2.2),
            ("2023-01-04", -1.1),
        ]
        .into_iter()
        .map(|(date, b)| vec![Value::from(date), Value::Float(b)])
        .collect(),
    );
    Exercise::scripted("rolling-mean", ResultSlot::binding("result"))
        .title("Rolling Average")
        .prompt(
            "Sort `df` by 'date' and compute the 3-row rolling mean of column 'B'. \
             The first two rows have no full window and hold `None`. Assign a table \
             with columns `date`, `rolling_mean` to `result`.",
        )
        .helpers(&[Helper::Table])
        .fixture(FixtureSpec::new().with_table("df", df))
        .reference(|ctx| {
            let df = ctx.table("df")?;
            let mut rows: Vec<(String, f64)> = df
                .rows
                .iter()
                .map(|row| -> Result<(String, f64), String> {
                    Ok((cell_str(df, row, "date")?.to_string(), cell_f64(df, row, "B")?))
                })
                .collect::<Result<_, String>>()?;
            rows.sort_by(|a, b| a.0.cmp(&b.0));
            let out = rows
                .iter()
                .enumerate()
                .map(|(i, (date, _))| {
                    let mean = if i < 2 {
                        Value::Null
                    } else {
                        Value::Float(rows[i - 2..=i].iter().map(|(_, b)| b).sum::<f64>() / 3.0)
                    };
                    vec![Value::Str(date.clone()), mean]
                })
                .collect();
            Ok(Value::Table(Table::new(columns(&["date", "rolling_mean"]), out)))
        })
        .comparator(Comparator::tabular_ordered())
        .starter(
            r#"
            from table import table

            result = table(["date", "rolling_mean"], [])
            "#,
        )
        .solution(
            r#"
            from table import table

            rows = sorted(df, key=lambda r: r["date"])
            values = [r["B"] for r in rows]
            out = []
            for i, r in enumerate(rows):
                if i < 2:
                    out.append([r["date"], None])
                else:
                    out.append([r["date"], sum(values[i - 2:i + 1]) / 3])
            result = table(["date", "rolling_mean"], out)
            "#,
        )
}

fn outlier_removal() -> Exercise {
    let df = Table::new(
        columns(&["id", "val"]),
        [1, 2, 3, 2, 3, 1, 2, 3, 2, 3, 100, 2]
            .into_iter()
            .enumerate()
            .map(|(i, val)| vec![Value::Int(i as i64 + 1), Value::Int(val)])
            .collect(),
    );
    Exercise::scripted("outlier-removal", ResultSlot::call("remove_outliers", &["df"]))
        .title("Outlier Remover")
        .prompt(
            "Implement `remove_outliers(df)`: drop every row whose 'val' is greater than \
             `mean + 3 * std` of that column (population standard deviation). Return a \
             table with the same columns, keeping the remaining rows in their original order.",
        )
        .helpers(&[Helper::Table, Helper::Math])
        .fixture(FixtureSpec::new().with_table("df", df))
        .reference(|ctx| {
            let df = ctx.table("df")?;
            let values = df
                .rows
                .iter()
                .map(|row| cell_f64(df, row, "val"))
                .collect::<Result<Vec<f64>, String>>()?;
            if values.is_empty() {
                return Err("df must have at least one row".into());
            }
            let n = values.len() as f64;
            let mean = values.iter().sum::<f64>() / n;
            let std = (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();
            let upper = mean + 3.0 * std;
            let rows = df
                .rows
                .iter()
                .zip(&values)
                .filter(|(_, v)| **v <= upper)
                .map(|(row, _)| row.clone())
                .collect();
            Ok(Value::Table(Table::new(df.columns.clone(), rows)))
        })
        .comparator(Comparator::tabular_ordered())
        .starter(
            r#"
            import math
            from table import table

            def remove_outliers(df):
                # compute the upper bound, then filter rows
                return df
            "#,
        )
        .solution(
            r#"
            import math
            from table import table

            def remove_outliers(df):
                values = [r["val"] for r in df]
                mean = sum(values) / len(values)
                std = math.sqrt(sum((v - mean) ** 2 for v in values) / len(values))
                upper = mean + 3 * std
                rows = [[r["id"], r["val"]] for r in df if r["val"] <= upper]
                return table(df.columns, rows)
            "#,
        )
}

// ---------------------------------------------------------------------------
// Statistics and ML metrics
// ---------------------------------------------------------------------------

fn log_loss() -> Exercise {
    Exercise::scripted("log-loss", ResultSlot::call("log_loss", &["y_true", "y_pred"]))
        .title("Log Loss from Scratch")
        .prompt(
            "Implement binary cross-entropy: the negative mean of \
             `y*log(p) + (1-y)*log(1-p)`. Clip predictions to `[1e-15, 1 - 1e-15]`.",
        )
        .helpers(&[Helper::Math])
        .fixture(
            FixtureSpec::new()
                .with("y_true", Value::int_list(&[1, 0, 1, 1]))
                .with("y_pred", Value::float_list(&[0.9, 0.1, 0.8, 0.4])),
        )
        .reference(|ctx| {
            let y_true = floats(list(ctx, "y_true")?)?;
            let y_pred = floats(list(ctx, "y_pred")?)?;
            if y_true.is_empty() || y_true.len() != y_pred.len() {
                return Err("y_true and y_pred must be non-empty and of equal length".into());
            }
            let eps = 1e-15;
            let total: f64 = y_true
                .iter()
                .zip(&y_pred)
                .map(|(y, p)| {
                    let p = p.clamp(eps, 1.0 - eps);
                    y * p.ln() + (1.0 - y) * (1.0 - p).ln()
                })
                .sum();
            Ok(Value::Float(-total / y_true.len() as f64))
        })
        .comparator(Comparator::numeric())
        .starter(
            r#"
            import math

            def log_loss(y_true, y_pred):
                epsilon = 1e-15
                return 0
            "#,
        )
        .solution(
            r#"
            import math

            def log_loss(y_true, y_pred):
                epsilon = 1e-15
                total = 0.0
                for y, p in zip(y_true, y_pred):
                    p = min(max(p, epsilon), 1 - epsilon)
                    total += y * math.log(p) + (1 - y) * math.log(1 - p)
                return -total / len(y_true)
            "#,
        )
}

fn t_statistic() -> Exercise {
    Exercise::scripted("t-statistic", ResultSlot::call("t_statistic", &["group_a", "group_b"]))
        .title("Two-Sample T-Statistic")
        .prompt(
            "Compute the pooled-variance two-sample t-statistic of `group_a` versus \
             `group_b` (sample variances with `n - 1`).",
        )
        .helpers(&[Helper::Math])
        .fixture(
            FixtureSpec::new()
                .with(
                    "group_a",
                    Value::float_list(&[10.2, 9.8, 11.1, 10.5, 9.6, 10.9, 10.0, 10.4]),
                )
                .with(
                    "group_b",
                    Value::float_list(&[10.9, 11.3, 10.7, 11.8, 10.6, 11.2, 11.5, 10.8]),
                ),
        )
        .reference(|ctx| {
            let a = floats(list(ctx, "group_a")?)?;
            let b = floats(list(ctx, "group_b")?)?;
            if a.len() < 2 || b.len() < 2 {
                return Err("each group needs at least two samples".into());
            }
            let mean = |xs: &[f64]| xs.iter().sum::<f64>() / xs.len() as f64;
            let var = |xs: &[f64], m: f64| {
                xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (xs.len() - 1) as f64
            };
            let (ma, mb) = (mean(&a), mean(&b));
            let (na, nb) = (a.len() as f64, b.len() as f64);
            let pooled = ((na - 1.0) * var(&a, ma) + (nb - 1.0) * var(&b, mb)) / (na + nb - 2.0);
            Ok(Value::Float((ma - mb) / (pooled * (1.0 / na + 1.0 / nb)).sqrt()))
        })
        .comparator(Comparator::numeric())
        .starter(
            r#"
            import math

            def t_statistic(group_a, group_b):
                pass
            "#,
        )
        .solution(
            r#"
            import math

            def t_statistic(group_a, group_b):
                na, nb = len(group_a), len(group_b)
                ma = sum(group_a) / na
                mb = sum(group_b) / nb
                va = sum((x - ma) ** 2 for x in group_a) / (na - 1)
                vb = sum((x - mb) ** 2 for x in group_b) / (nb - 1)
                pooled = ((na - 1) * va + (nb - 1) * vb) / (na + nb - 2)
                return (ma - mb) / math.sqrt(pooled * (1 / na + 1 / nb))
            "#,
        )
}

fn sample_size() -> Exercise {
    Exercise::scripted(
        "sample-size",
        ResultSlot::call("sample_size", &["baseline", "mde", "z_alpha", "z_beta"]),
    )
    .title("A/B Test Sample Size")
    .prompt(
        "Return the visitors needed per variant to detect a relative lift `mde` over \
         conversion rate `baseline`, using the normal approximation for two \
         proportions. Round up to an integer.",
    )
    .helpers(&[Helper::Math])
    .fixture(
        FixtureSpec::new()
            .with("baseline", 0.2)
            .with("mde", 0.1)
            .with("z_alpha", 1.959963984540054)
            .with("z_beta", 0.8416212335729143),
    )
    .reference(|ctx| {
        let p1 = float(ctx, "baseline")?;
        let p2 = p1 * (1.0 + float(ctx, "mde")?);
        let p_pool = (p1 + p2) / 2.0;
        let sd1 = (2.0 * p_pool * (1.0 - p_pool)).sqrt();
        let sd2 = (p1 * (1.0 - p1) + p2 * (1.0 - p2)).sqrt();
        let z = float(ctx, "z_alpha")? * sd1 + float(ctx, "z_beta")? * sd2;
        let n = (z * z) / ((p2 - p1) * (p2 - p1));
        if !n.is_finite() {
            return Err("sample size is not finite".into());
        }
        Ok(Value::Int(n.ceil() as i64))
    })
    .starter(
        r#"
        import math

        def sample_size(baseline, mde, z_alpha, z_beta):
            pass
        "#,
    )
    .solution(
        r#"
        import math

        def sample_size(baseline, mde, z_alpha, z_beta):
            p1 = baseline
            p2 = baseline * (1 + mde)
            p_pool = (p1 + p2) / 2
            sd1 = math.sqrt(2 * p_pool * (1 - p_pool))
            sd2 = math.sqrt(p1 * (1 - p1) + p2 * (1 - p2))
            n = (z_alpha * sd1 + z_beta * sd2) ** 2 / (p2 - p1) ** 2
            return int(math.ceil(n))
        "#,
    )
}

// ---------------------------------------------------------------------------
// SQL
// ---------------------------------------------------------------------------

fn sql_high_earners() -> Exercise {
    Exercise::query("sql-high-earners")
        .title("High Earners in Engineering")
        .prompt(
            "Select every column of the employees who work in 'Engineering' and earn \
             more than 125,000.",
        )
        .fixture(sql_schema())
        .reference(|ctx| {
            let employees = ctx.table("employees")?;
            let mut rows = Vec::new();
            for row in &employees.rows {
                if cell_str(employees, row, "department")? == "Engineering"
                    && cell_int(employees, row, "salary")? > 125_000
                {
                    rows.push(row.clone());
                }
            }
            Ok(Value::Table(Table::new(employees.columns.clone(), rows)))
        })
        .comparator(Comparator::tabular_sorted_by(&["id"]))
        .starter("SELECT * FROM employees WHERE ...")
        .solution(
            r#"
            SELECT *
            FROM employees
            WHERE department = 'Engineering'
              AND salary > 125000
            "#,
        )
}

fn sql_total_sales() -> Exercise {
    Exercise::query("sql-total-sales")
        .title("Total Sales per Employee")
        .prompt(
            "For every employee with at least one sale, return `name` and the sum of \
             their sale amounts as `total_sales`.",
        )
        .fixture(sql_schema())
        .reference(|ctx| {
            let employees = ctx.table("employees")?;
            let sales = ctx.table("sales")?;
            let mut totals: BTreeMap<String, i64> = BTreeMap::new();
            for sale in &sales.rows {
                let employee_id = cell_int(sales, sale, "employee_id")?;
                let amount = cell_int(sales, sale, "amount")?;
                for emp in &employees.rows {
                    if cell_int(employees, emp, "id")? == employee_id {
                        *totals
                            .entry(cell_str(employees, emp, "name")?.to_string())
                            .or_default() += amount;
                    }
                }
            }
            let rows = totals
                .into_iter()
                .map(|(name, total)| vec![Value::Str(name), Value::Int(total)])
                .collect();
            Ok(Value::Table(Table::new(columns(&["name", "total_sales"]), rows)))
        })
        .comparator(Comparator::tabular_sorted_by(&["name"]))
        .starter(
            r#"
            SELECT e.name, ...
            FROM employees e
            JOIN sales s ON ...
            "#,
        )
        .solution(
            r#"
            SELECT e.name, SUM(s.amount) AS total_sales
            FROM employees e
            JOIN sales s ON e.id = s.employee_id
            GROUP BY e.name
            "#,
        )
}

fn sql_salary_rank() -> Exercise {
    Exercise::query("sql-salary-rank")
        .title("Salary Rank per Department")
        .prompt(
            "Rank each employee's salary within their department, highest first, using \
             `DENSE_RANK()`. Return `name`, `department`, `salary`, `salary_rank`.",
        )
        .fixture(sql_schema())
        .reference(|ctx| {
            let employees = ctx.table("employees")?;
            let mut by_dept: BTreeMap<String, Vec<i64>> = BTreeMap::new();
            for row in &employees.rows {
                by_dept
                    .entry(cell_str(employees, row, "department")?.to_string())
                    .or_default()
                    .push(cell_int(employees, row, "salary")?);
            }
            for salaries in by_dept.values_mut() {
                salaries.sort_unstable_by(|a, b| b.cmp(a));
                salaries.dedup();
            }
            let mut rows = Vec::new();
            for row in &employees.rows {
                let dept = cell_str(employees, row, "department")?;
                let salary = cell_int(employees, row, "salary")?;
                let rank = by_dept
                    .get(dept)
                    .and_then(|s| s.iter().position(|x| *x == salary))
                    .ok_or_else(|| format!("no salary bucket for {dept}"))?;
                rows.push(vec![
                    cell(employees, row, "name")?.clone(),
                    Value::from(dept),
                    Value::Int(salary),
                    Value::Int(rank as i64 + 1),
                ]);
            }
            Ok(Value::Table(Table::new(
                columns(&["name", "department", "salary", "salary_rank"]),
                rows,
            )))
        })
        .comparator(Comparator::tabular_sorted_by(&["name"]))
        .starter(
            r#"
            SELECT name, department, salary,
                   ... OVER (...) AS salary_rank
            FROM employees
            "#,
        )
        .solution(
            r#"
            SELECT
                name,
                department,
                salary,
                DENSE_RANK() OVER (
                    PARTITION BY department
                    ORDER BY salary DESC
                ) AS salary_rank
            FROM employees
            "#,
        )
}

fn sql_running_total() -> Exercise {
    Exercise::query("sql-running-total")
        .title("Running Sales Total")
        .prompt(
            "Return `id`, `date`, `amount` and a cumulative `running_total` of `amount` \
             for every sale, ordered by `date` then `id`.",
        )
        .fixture(sql_schema())
        .reference(|ctx| {
            let sales = ctx.table("sales")?;
            let mut rows: Vec<(String, i64, i64)> = sales
                .rows
                .iter()
                .map(|row| -> Result<(String, i64, i64), String> {
                    Ok((
                        cell_str(sales, row, "date")?.to_string(),
                        cell_int(sales, row, "id")?,
                        cell_int(sales, row, "amount")?,
                    ))
                })
                .collect::<Result<_, String>>()?;
            rows.sort();
            let mut running = 0;
            let out = rows
                .into_iter()
                .map(|(date, id, amount)| {
                    running += amount;
                    vec![
                        Value::Int(id),
                        Value::Str(date),
                        Value::Int(amount),
                        Value::Int(running),
                    ]
                })
                .collect();
            Ok(Value::Table(Table::new(
                columns(&["id", "date", "amount", "running_total"]),
                out,
            )))
        })
        .comparator(Comparator::tabular_ordered())
        .starter(
            r#"
            SELECT id, date, amount,
                   SUM(amount) OVER (...) AS running_total
            FROM sales
            "#,
        )
        .solution(
            r#"
            SELECT
                id,
                date,
                amount,
                SUM(amount) OVER (ORDER BY date, id) AS running_total
            FROM sales
            ORDER BY date, id
            "#,
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ExerciseRegistry;

    #[test]
    fn test_catalogue_validates_and_primes() {
        let registry = ExerciseRegistry::new(builtin()).expect("catalogue must validate");
        registry.prime().expect("every reference must compute");
        assert_eq!(registry.len(), 21);
    }

    fn reference(key: &str) -> Value {
        let registry = ExerciseRegistry::new(builtin()).expect("registry");
        let value = registry
            .reference(key)
            .expect("known key")
            .expect("reference")
            .clone();
        value
    }

    #[test]
    fn test_algorithm_references() {
        assert_eq!(reference("pair-sum"), Value::int_list(&[0, 1]));
        assert_eq!(reference("valid-anagram"), Value::Bool(true));
        assert_eq!(reference("contains-duplicate"), Value::Bool(true));
        assert_eq!(reference("valid-parentheses"), Value::Bool(true));
        assert_eq!(reference("container-most-water"), Value::Int(49));
        assert_eq!(reference("longest-substring"), Value::Int(3));
        assert_eq!(reference("number-of-islands"), Value::Int(3));
        assert_eq!(reference("climbing-stairs"), Value::Int(8));
        assert_eq!(
            reference("merge-sorted-lists"),
            Value::int_list(&[1, 1, 2, 3, 4, 4, 5, 6])
        );
        assert_eq!(reference("array-intersection"), Value::int_list(&[4, 9]));
    }

    #[test]
    fn test_metric_references() {
        let Value::Float(loss) = reference("log-loss") else {
            panic!("log-loss must be a float");
        };
        assert!((loss - 0.33754).abs() < 1e-4, "{loss}");
        assert_eq!(reference("sample-size"), Value::Int(6510));
        assert!(matches!(reference("t-statistic"), Value::Float(t) if t < 0.0));
    }

    #[test]
    fn test_sql_references() {
        let Value::Table(high) = reference("sql-high-earners") else {
            panic!("table expected");
        };
        assert_eq!(high.rows.len(), 1);
        assert_eq!(high.rows[0][1], Value::from("Charlie"));

        let Value::Table(totals) = reference("sql-total-sales") else {
            panic!("table expected");
        };
        assert_eq!(
            totals.rows,
            vec![
                vec![Value::from("Bob"), Value::Int(1200)],
                vec![Value::from("Charlie"), Value::Int(200)],
                vec![Value::from("Eve"), Value::Int(1500)],
            ]
        );

        let Value::Table(running) = reference("sql-running-total") else {
            panic!("table expected");
        };
        let totals: Vec<&Value> = running.column("running_total").expect("column");
        assert_eq!(
            totals,
            vec![
                &Value::Int(500),
                &Value::Int(700),
                &Value::Int(1400),
                &Value::Int(2400),
                &Value::Int(2900)
            ]
        );
    }

    #[test]
    fn test_rolling_mean_leads_with_nulls() {
        let Value::Table(t) = reference("rolling-mean") else {
            panic!("table expected");
        };
        let means = t.column("rolling_mean").expect("column");
        assert_eq!(means[0], &Value::Null);
        assert_eq!(means[1], &Value::Null);
        assert!(matches!(means[2], Value::Float(m) if (m - (0.2 + 0.9 + 1.5) / 3.0).abs() < 1e-12));
        assert_eq!(t.rows[0][0], Value::from("2023-01-01"));
    }

    #[test]
    fn test_outlier_removal_drops_only_the_spike() {
        let Value::Table(t) = reference("outlier-removal") else {
            panic!("table expected");
        };
        assert_eq!(t.rows.len(), 11);
        assert!(t.column("val").expect("column").iter().all(|v| **v != Value::Int(100)));
        assert_eq!(t.rows[10][0], Value::Int(12));
    }

    #[test]
    fn test_every_exercise_has_a_solution() {
        for exercise in builtin() {
            assert!(!exercise.solution.trim().is_empty(), "{}", exercise.key);
            assert!(!exercise.prompt.is_empty(), "{}", exercise.key);
        }
    }
}
