use alloy::sol;

// ─── Loyalty Token Interface ────────────────────────────────────────────────
sol! {
    #[allow(missing_docs)]
    #[derive(Debug, PartialEq, Eq)]
    contract LoyaltyToken {
        // === ERC-20 core event ===
        event Transfer(address indexed from, address indexed to, uint256 value);

        // === Supply events ===
        //
        // The trailing `timestamp` is emitted by the contract for convenience;
        // the authoritative time is the block header timestamp.
        event TokenMinted(address indexed to, uint256 amount, uint256 timestamp);
        event TokenBurned(address indexed from, uint256 amount, uint256 timestamp);

        // === ERC-20 view functions ===
        function name() external view returns (string memory);
        function symbol() external view returns (string memory);
        function decimals() external pure returns (uint8);
        function totalSupply() external view returns (uint256);
        function balanceOf(address account) external view returns (uint256);
    }
}
